use super::callbacks::{CallbackHandlers, DeliveryOutcome, TransportEvent};
use super::transport::{EnqueueError, Settings, Transport};
use crate::{Error, Result};
use rdkafka::client::ClientContext;
use rdkafka::error::KafkaError;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer, ProducerContext};
use rdkafka::statistics::Statistics;
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::Message;
use std::time::Duration;
use tracing::{error, info};

const MAX_TOPIC_NAME_LEN: usize = 249;

/// librdkafka context routing client callbacks into [`CallbackHandlers`].
pub struct PublishContext {
    handlers: CallbackHandlers,
}

impl ClientContext for PublishContext {
    fn stats(&self, statistics: Statistics) {
        let up = brokers_up(&statistics);
        if up > 0 {
            self.handlers.on_event(&TransportEvent::BrokersUp { count: up });
        }
    }

    fn error(&self, error: KafkaError, reason: &str) {
        self.handlers.on_event(&event_for_error(error, reason));
    }
}

/// Number of brokers librdkafka reports in state `UP`.
fn brokers_up(statistics: &Statistics) -> usize {
    statistics
        .brokers
        .values()
        .filter(|broker| broker.state == "UP")
        .count()
}

fn event_for_error(error: KafkaError, reason: &str) -> TransportEvent {
    match error.rdkafka_error_code() {
        Some(RDKafkaErrorCode::AllBrokersDown) => TransportEvent::AllBrokersDown {
            reason: reason.to_string(),
        },
        _ => TransportEvent::Error {
            error,
            reason: reason.to_string(),
        },
    }
}

impl ProducerContext for PublishContext {
    type DeliveryOpaque = ();

    fn delivery(&self, delivery_result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        let outcome = match delivery_result {
            Ok(message) => DeliveryOutcome {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: Some(message.offset()),
                error: None,
            },
            Err((e, message)) => DeliveryOutcome {
                topic: message.topic().to_string(),
                partition: message.partition(),
                offset: None,
                error: Some(e.clone()),
            },
        };
        self.handlers.on_delivery(&outcome);
    }
}

/// [`Transport`] backed by an rdkafka `BaseProducer`.
///
/// The base producer does no polling of its own: delivery reports and
/// events are only served from [`Transport::poll`].
pub struct KafkaTransport {
    producer: BaseProducer<PublishContext>,
}

impl KafkaTransport {
    pub fn connect(settings: &Settings, handlers: CallbackHandlers) -> Result<Self> {
        let client_config = settings.client_config();

        // Unknown or malformed properties are caught here, before any client exists.
        client_config.create_native_config().map_err(|e| {
            error!(error = %e, "Invalid Kafka client settings");
            Error::Config(e.to_string())
        })?;

        let producer: BaseProducer<PublishContext> = client_config
            .create_with_context(PublishContext { handlers })
            .map_err(|e| {
                error!(error = %e, "Unable to create Kafka producer");
                Error::ClientCreate(e)
            })?;

        info!(
            brokers = settings.global.get("bootstrap.servers").map(String::as_str).unwrap_or(""),
            "Kafka producer created"
        );
        Ok(Self { producer })
    }
}

impl Transport for KafkaTransport {
    fn create_topic(&self, name: &str) -> std::result::Result<(), String> {
        validate_topic_name(name)
    }

    fn enqueue(&self, topic: &str, partition: i32, payload: &[u8]) -> std::result::Result<(), EnqueueError> {
        let record: BaseRecord<'_, (), [u8]> = BaseRecord::to(topic).partition(partition).payload(payload);

        match self.producer.send(record) {
            Ok(()) => Ok(()),
            Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), _)) => Err(EnqueueError::QueueFull),
            Err((e, _)) => Err(EnqueueError::Rejected(e)),
        }
    }

    fn poll(&self, timeout: Duration) {
        self.producer.poll(timeout);
    }

    fn outstanding(&self) -> usize {
        self.producer.in_flight_count().max(0) as usize
    }

    fn shutdown(&self, timeout: Duration) -> std::result::Result<(), KafkaError> {
        self.producer.flush(timeout)
    }
}

/// Kafka's own topic naming rules.
fn validate_topic_name(name: &str) -> std::result::Result<(), String> {
    if name == "." || name == ".." {
        return Err(format!("'{}' is not a legal topic name", name));
    }
    if name.len() > MAX_TOPIC_NAME_LEN {
        return Err(format!(
            "topic name is {} characters, the maximum is {}",
            name.len(),
            MAX_TOPIC_NAME_LEN
        ));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(format!("topic name '{}' contains illegal character '{}'", name, c));
    }
    Ok(())
}
