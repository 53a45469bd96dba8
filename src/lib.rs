pub mod config;
pub mod error;
pub mod health;

pub mod kafka;

pub use config::{BrokerConfig, Config};
pub use error::{Error, Result};
pub use health::{HealthSnapshot, HealthState, LoggingStatusRegistry, StatusRegistry};
pub use kafka::{Producer, ProducerState, PublishOptions};
