pub mod callbacks;
pub mod client;
pub mod key;
pub mod partitioner;
pub mod producer;
pub mod topic_registry;
pub mod transport;


pub use callbacks::{CallbackHandlers, DeliveryOutcome, TransportEvent};
pub use client::KafkaTransport;
pub use key::extract_partition_key;
pub use partitioner::{HashPartitioner, Partitioner};
pub use producer::{Poller, Producer, ProducerState, PublishOptions, HEALTH_COMPONENT};
pub use topic_registry::{TopicHandle, TopicRegistry};
pub use transport::{EnqueueError, Settings, Transport};
