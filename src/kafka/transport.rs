use crate::config::{BrokerConfig, DeliveryMode};
use crate::{Error, Result};
use rdkafka::error::KafkaError;
use rdkafka::ClientConfig;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::error;

/// Outcome of a single enqueue attempt that did not succeed.
#[derive(Debug)]
pub enum EnqueueError {
    /// The outbound buffer is full. Transient; poll and try again.
    QueueFull,
    /// Anything else. The message is not in the queue.
    Rejected(KafkaError),
}

/// The operations the producer core needs from a message transport.
///
/// Implementations are shared between the calling threads and whatever
/// background context the transport uses for I/O, hence `Send + Sync`.
pub trait Transport: Send + Sync + 'static {
    /// Prepares the transport to accept messages for `name`.
    fn create_topic(&self, name: &str) -> std::result::Result<(), String>;

    fn enqueue(&self, topic: &str, partition: i32, payload: &[u8]) -> std::result::Result<(), EnqueueError>;

    /// Serves queued delivery reports and events, blocking up to `timeout`.
    fn poll(&self, timeout: Duration);

    /// Messages enqueued but not yet acknowledged or failed.
    fn outstanding(&self) -> usize;

    /// Waits for in-flight work before the transport is released.
    fn shutdown(&self, timeout: Duration) -> std::result::Result<(), KafkaError>;
}

/// Global and topic-level client properties derived from a [`BrokerConfig`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub global: BTreeMap<String, String>,
    pub topic: BTreeMap<String, String>,
}

impl Settings {
    pub fn build(config: &BrokerConfig) -> Result<Self> {
        config.validate().map_err(|e| {
            error!(error = %e, "Rejected broker configuration");
            e
        })?;

        let mut settings = Settings::default();
        settings
            .set_global("bootstrap.servers", config.bootstrap_servers())
            .set_global("client.id", &config.client_id)
            .set_global("socket.timeout.ms", config.socket_timeout_ms.to_string())
            .set_global("statistics.interval.ms", config.statistics_interval_ms.to_string())
            .set_topic("message.timeout.ms", config.message_timeout_ms.to_string());

        match config.mode {
            DeliveryMode::Async => {
                settings
                    .set_global("queue.buffering.max.messages", config.queue_max_messages.to_string())
                    .set_global("batch.num.messages", config.batch_num_messages.to_string())
                    .set_global("queue.buffering.max.ms", config.queue_buffering_max_ms.to_string());
            }
            DeliveryMode::Sync => {
                settings
                    .set_global("queue.buffering.max.ms", "0")
                    .set_global("batch.num.messages", "1");
            }
        }

        for (key, value) in &config.extra {
            if key.trim().is_empty() {
                return Err(Error::Config("empty property name in extra settings".to_string()));
            }
            settings.set_global(key, value);
        }

        Ok(settings)
    }

    fn set_global(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.global.insert(key.to_string(), value.into());
        self
    }

    fn set_topic(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.topic.insert(key.to_string(), value.into());
        self
    }

    /// Single librdkafka configuration. Topic-level properties become the
    /// defaults for every topic the client produces to.
    pub fn client_config(&self) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        for (key, value) in self.topic.iter().chain(self.global.iter()) {
            client_config.set(key, value);
        }
        client_config
    }
}
