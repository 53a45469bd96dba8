//! Error types and result handling for kafka-publisher.
//!
//! This module defines the main error type [`Error`] and a convenience
//! [`Result`] type alias used throughout the crate.
//!
//! # Example
//!
//! ```rust
//! use kafka_publisher::{Error, Result};
//!
//! fn check_payload(payload: &[u8]) -> Result<()> {
//!     if payload.is_empty() {
//!         return Err(Error::InvalidArgument("empty payload".to_string()));
//!     }
//!     Ok(())
//! }
//!
//! match check_payload(b"") {
//!     Ok(()) => println!("Accepted"),
//!     Err(Error::InvalidArgument(msg)) => eprintln!("Rejected: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! ```

use rdkafka::error::KafkaError;
use std::time::Duration;
use thiserror::Error;

/// The main error type for kafka-publisher operations.
///
/// Transient queue-full conditions never show up here: they are absorbed by
/// the publish retry loop and only surface as [`Error::Overloaded`] once the
/// retry budget is spent.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid broker configuration; the client settings could not be built.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The configuration file or environment could not be loaded.
    #[error("Configuration load error: {0}")]
    ConfigLoad(#[from] config::ConfigError),

    /// The Kafka client handle could not be constructed.
    #[error("Failed to create Kafka client: {0}")]
    ClientCreate(#[source] KafkaError),

    /// Rejected input: empty payload, unparseable JSON or missing key field.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Duplicate registration, unknown topic or topic handle creation failure.
    #[error("Topic error: {0}")]
    Topic(String),

    /// Non-transient enqueue failure. The message has been dropped.
    #[error("Transport error: {0}")]
    Transport(#[source] KafkaError),

    /// The outbound queue stayed full for the whole retry budget.
    #[error("Producer overloaded after {attempts} attempts ({waited:?})")]
    Overloaded {
        /// Number of enqueue attempts made
        attempts: u32,
        /// Time spent waiting for queue space
        waited: Duration,
    },

    /// A retry or drain loop was aborted through the cancellation signal.
    #[error("Operation cancelled")]
    Cancelled,

    /// The producer has been closed and accepts no more work.
    #[error("Producer is closed")]
    Closed,

    /// The close drain gave up before the outbound queue emptied.
    #[error("Timed out with {outstanding} messages still outstanding")]
    Timeout {
        /// Messages still in the outbound queue
        outstanding: usize,
    },

    /// I/O error, typically from reading input in the command-line publisher.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenient Result type alias for kafka-publisher operations.
///
/// This is equivalent to `std::result::Result<T, kafka_publisher::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::types::RDKafkaErrorCode;

    #[test]
    fn test_error_display() {
        let err = Error::Transport(KafkaError::MessageProduction(
            RDKafkaErrorCode::MessageSizeTooLarge,
        ));
        assert!(err.to_string().starts_with("Transport error:"));

        let err = Error::Overloaded {
            attempts: 3,
            waited: Duration::from_millis(30),
        };
        assert!(err.to_string().contains("3 attempts"));

        let err = Error::Timeout { outstanding: 7 };
        assert_eq!(err.to_string(), "Timed out with 7 messages still outstanding");
    }
}
