//! Hooks invoked from the transport's background context.

use crate::health::HealthState;
use rdkafka::error::KafkaError;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Final outcome of a previously enqueued message.
#[derive(Debug, Clone)]
pub struct DeliveryOutcome {
    pub topic: String,
    pub partition: i32,
    pub offset: Option<i64>,
    pub error: Option<KafkaError>,
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Broker-level events reported by the transport.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// No broker is reachable.
    AllBrokersDown { reason: String },
    /// At least one broker reports an established connection.
    BrokersUp { count: usize },
    /// Any other client-level error; logged, health untouched.
    Error { error: KafkaError, reason: String },
}

#[derive(Clone)]
pub struct CallbackHandlers {
    health: Arc<HealthState>,
}

impl CallbackHandlers {
    pub fn new(health: Arc<HealthState>) -> Self {
        Self { health }
    }

    pub fn on_delivery(&self, outcome: &DeliveryOutcome) {
        self.health.record_delivery(outcome.is_success());

        match &outcome.error {
            None => {
                debug!(
                    topic = %outcome.topic,
                    partition = outcome.partition,
                    offset = ?outcome.offset,
                    "Message delivered"
                );
                self.health.mark_connected();
            }
            Some(e) => {
                error!(
                    topic = %outcome.topic,
                    partition = outcome.partition,
                    error = %e,
                    "Message delivery failed"
                );
                self.health.mark_disconnected();
            }
        }
    }

    pub fn on_event(&self, event: &TransportEvent) {
        match event {
            TransportEvent::AllBrokersDown { reason } => {
                error!(reason = %reason, "All brokers are down");
                self.health.mark_disconnected();
            }
            TransportEvent::BrokersUp { count } => {
                if self.health.mark_connected() {
                    debug!(brokers = count, "Brokers reachable again");
                }
            }
            TransportEvent::Error { error, reason } => {
                warn!(error = %error, reason = %reason, "Kafka client error");
            }
        }
    }
}

impl std::fmt::Debug for CallbackHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackHandlers")
            .field("health", &self.health)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::test_support::RecordingRegistry;
    use rdkafka::types::RDKafkaErrorCode;

    fn handlers() -> (CallbackHandlers, Arc<HealthState>, Arc<RecordingRegistry>) {
        let registry = Arc::new(RecordingRegistry::default());
        let health = HealthState::new("kafka", registry.clone()).unwrap();
        (CallbackHandlers::new(health.clone()), health, registry)
    }

    fn outcome(error: Option<KafkaError>) -> DeliveryOutcome {
        DeliveryOutcome {
            topic: "orders".to_string(),
            partition: 2,
            offset: error.is_none().then_some(17),
            error,
        }
    }

    #[test]
    fn test_delivery_failure_disconnects() {
        let (handlers, health, registry) = handlers();
        health.mark_connected();

        let failure = KafkaError::MessageProduction(RDKafkaErrorCode::MessageTimedOut);
        handlers.on_delivery(&outcome(Some(failure.clone())));
        handlers.on_delivery(&outcome(Some(failure)));
        assert!(!health.is_connected());

        handlers.on_delivery(&outcome(None));
        assert!(health.is_connected());

        assert_eq!(registry.wait_for(3), vec![true, false, true]);
        let snapshot = health.snapshot();
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.delivery_failures, 2);
    }

    #[test]
    fn test_broker_events() {
        let (handlers, health, registry) = handlers();
        health.mark_connected();

        handlers.on_event(&TransportEvent::AllBrokersDown {
            reason: "1/1 brokers are down".to_string(),
        });
        assert!(!health.is_connected());

        handlers.on_event(&TransportEvent::Error {
            error: KafkaError::Global(RDKafkaErrorCode::BrokerTransportFailure),
            reason: "connection refused".to_string(),
        });
        assert!(!health.is_connected());

        handlers.on_event(&TransportEvent::BrokersUp { count: 1 });
        handlers.on_event(&TransportEvent::BrokersUp { count: 2 });
        assert!(health.is_connected());

        assert_eq!(registry.wait_for(3), vec![true, false, true]);
    }
}
