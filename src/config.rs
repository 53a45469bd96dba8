use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub kafka: BrokerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    pub brokers: Vec<String>,
    #[serde(default = "default_partitions")]
    pub partitions: i32,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u32,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u32,
    #[serde(default = "default_queue_max_messages")]
    pub queue_max_messages: u32,
    #[serde(default = "default_batch_num_messages")]
    pub batch_num_messages: u32,
    #[serde(default = "default_queue_buffering_max_ms")]
    pub queue_buffering_max_ms: u32,
    #[serde(default)]
    pub mode: DeliveryMode,
    #[serde(default = "default_partition_key_field")]
    pub partition_key_field: String,
    #[serde(default = "default_statistics_interval_ms")]
    pub statistics_interval_ms: u32,
    #[serde(default)]
    pub close_timeout_ms: Option<u64>,
    #[serde(default)]
    pub backpressure: BackpressureConfig,
    /// Raw librdkafka properties applied last, overriding anything above.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    #[default]
    Async,
    Sync,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackpressureConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// How long a publish keeps retrying a full queue. `0` retries without
    /// a time limit.
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("KAFKA_PUBLISHER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.kafka.validate()?;
        Ok(config)
    }
}

impl BrokerConfig {
    /// Minimal configuration for the given brokers; everything else defaulted.
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            partitions: default_partitions(),
            client_id: default_client_id(),
            socket_timeout_ms: default_socket_timeout_ms(),
            message_timeout_ms: default_message_timeout_ms(),
            queue_max_messages: default_queue_max_messages(),
            batch_num_messages: default_batch_num_messages(),
            queue_buffering_max_ms: default_queue_buffering_max_ms(),
            mode: DeliveryMode::default(),
            partition_key_field: default_partition_key_field(),
            statistics_interval_ms: default_statistics_interval_ms(),
            close_timeout_ms: None,
            backpressure: BackpressureConfig::default(),
            extra: HashMap::new(),
        }
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(Error::Config("at least one broker address is required".to_string()));
        }
        if self.partitions < 1 {
            return Err(Error::Config(format!(
                "partition count must be at least 1, got {}",
                self.partitions
            )));
        }
        if self.partition_key_field.trim().is_empty() {
            return Err(Error::Config("partition_key_field must not be empty".to_string()));
        }
        if self.mode == DeliveryMode::Async && self.queue_max_messages == 0 {
            return Err(Error::Config("queue_max_messages must be positive".to_string()));
        }
        if self.backpressure.poll_interval_ms == 0 {
            return Err(Error::Config("backpressure.poll_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn bootstrap_servers(&self) -> String {
        self.brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn close_timeout(&self) -> Option<Duration> {
        self.close_timeout_ms.map(Duration::from_millis)
    }
}

impl BackpressureConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_ms > 0).then(|| Duration::from_millis(self.deadline_ms))
    }
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            deadline_ms: default_deadline_ms(),
            max_retries: None,
        }
    }
}

fn default_partitions() -> i32 {
    1
}

fn default_client_id() -> String {
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("rdkafka@{}", host)
}

fn default_socket_timeout_ms() -> u32 {
    60_000
}

fn default_message_timeout_ms() -> u32 {
    300_000
}

fn default_queue_max_messages() -> u32 {
    100_000
}

fn default_batch_num_messages() -> u32 {
    10_000
}

fn default_queue_buffering_max_ms() -> u32 {
    5
}

fn default_partition_key_field() -> String {
    "key".to_string()
}

fn default_statistics_interval_ms() -> u32 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_deadline_ms() -> u64 {
    30_000
}
