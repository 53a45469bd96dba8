use super::callbacks::CallbackHandlers;
use super::client::KafkaTransport;
use super::key::extract_partition_key;
use super::partitioner::{HashPartitioner, Partitioner};
use super::topic_registry::{TopicHandle, TopicRegistry};
use super::transport::{EnqueueError, Settings, Transport};
use crate::config::{BackpressureConfig, BrokerConfig};
use crate::health::{HealthSnapshot, HealthState, StatusRegistry};
use crate::{Error, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Identifier under which broker health is reported.
pub const HEALTH_COMPONENT: &str = "kafka";

const CLOSE_POLL_INTERVAL: Duration = Duration::from_millis(1000);
const SHUTDOWN_WAIT: Duration = Duration::from_millis(1000);

static NEXT_PRODUCER_ID: AtomicU64 = AtomicU64::new(1);

const RUNNING: u8 = 0;
const CLOSING: u8 = 1;
const CLOSED: u8 = 2;

/// Producer lifecycle as seen from outside.
///
/// `Uninitialized` and `Initializing` precede construction: [`Producer::init`]
/// only hands out a value once the client exists, so a live producer reports
/// one of the remaining states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    Uninitialized,
    Initializing,
    Connected,
    Disconnected,
    Closing,
    Closed,
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProducerState::Uninitialized => "uninitialized",
            ProducerState::Initializing => "initializing",
            ProducerState::Connected => "connected",
            ProducerState::Disconnected => "disconnected",
            ProducerState::Closing => "closing",
            ProducerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Per-call publish parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Explicit target partition, bypassing the partitioner.
    pub partition: Option<i32>,
    /// Upper bound on time spent waiting for queue space.
    pub timeout: Option<Duration>,
}

impl PublishOptions {
    pub fn partition(mut self, partition: i32) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// The publishing core.
///
/// Owns the transport client, the topic registry and the health state.
/// Every method takes `&self`; share it across threads with an `Arc`.
pub struct Producer<T: Transport = KafkaTransport> {
    id: u64,
    transport: T,
    topics: TopicRegistry,
    health: Arc<HealthState>,
    partitioner: Box<dyn Partitioner>,
    partition_count: i32,
    key_field: String,
    backpressure: BackpressureConfig,
    close_timeout: Option<Duration>,
    lifecycle: AtomicU8,
    cancel_epoch: AtomicU64,
}

impl Producer<KafkaTransport> {
    /// Builds the client settings, wires the callbacks and creates the
    /// rdkafka producer.
    pub fn init(config: &BrokerConfig, registry: Arc<dyn StatusRegistry>) -> Result<Self> {
        Self::init_with(config, registry, KafkaTransport::connect)
    }
}

impl<T: Transport> Producer<T> {
    /// Like [`Producer::init`] with a caller-supplied transport constructor.
    pub fn init_with<F>(config: &BrokerConfig, registry: Arc<dyn StatusRegistry>, connect: F) -> Result<Self>
    where
        F: FnOnce(&Settings, CallbackHandlers) -> Result<T>,
    {
        let health = HealthState::new(HEALTH_COMPONENT, registry)?;
        health.announce();

        info!(
            state = %ProducerState::Initializing,
            brokers = ?config.brokers,
            partitions = config.partitions,
            mode = ?config.mode,
            "Initializing producer"
        );

        let settings = Settings::build(config)?;
        let transport = connect(&settings, CallbackHandlers::new(health.clone()))?;

        let id = NEXT_PRODUCER_ID.fetch_add(1, Ordering::Relaxed);
        let producer = Self {
            id,
            transport,
            topics: TopicRegistry::new(id),
            health,
            partitioner: Box::new(HashPartitioner),
            partition_count: config.partitions,
            key_field: config.partition_key_field.clone(),
            backpressure: config.backpressure.clone(),
            close_timeout: config.close_timeout(),
            lifecycle: AtomicU8::new(RUNNING),
            cancel_epoch: AtomicU64::new(0),
        };

        producer.health.mark_connected();
        info!(producer_id = id, state = %producer.state(), "Producer initialized");
        Ok(producer)
    }

    /// Replaces the default djb2 hash partitioner.
    pub fn with_partitioner(mut self, partitioner: impl Partitioner + 'static) -> Self {
        self.partitioner = Box::new(partitioner);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ProducerState {
        match self.lifecycle.load(Ordering::Acquire) {
            CLOSING => ProducerState::Closing,
            CLOSED => ProducerState::Closed,
            _ if self.health.is_connected() => ProducerState::Connected,
            _ => ProducerState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.health.is_connected()
    }

    pub fn health(&self) -> HealthSnapshot {
        self.health.snapshot()
    }

    pub fn partition_count(&self) -> i32 {
        self.partition_count
    }

    pub fn outstanding(&self) -> usize {
        self.transport.outstanding()
    }

    /// Registers a topic so it can be published to. Registering the same
    /// name twice fails, as does registering on a closing or closed producer.
    pub fn register(&self, topic: &str) -> Result<TopicHandle> {
        if !self.is_running() {
            warn!(topic, state = %self.state(), "Topic registration on a producer that is not running");
            return Err(Error::Topic(format!(
                "cannot register '{}': producer is {}",
                topic,
                self.state()
            )));
        }
        self.topics.register(topic, |name| self.transport.create_topic(name))
    }

    pub fn lookup(&self, topic: &str) -> Option<TopicHandle> {
        self.topics.lookup(topic)
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.topics()
    }

    /// Partition the hash partitioner picks for `key` on `topic`.
    pub fn select_partition(&self, topic: &str, key: &str) -> i32 {
        self.partitioner.select(topic, key.as_bytes(), self.partition_count, 0)
    }

    /// Enqueues `payload` on `topic` and returns the number of bytes handed
    /// to the transport.
    ///
    /// Success means the message is queued, not delivered; the delivery
    /// outcome arrives later through the delivery callback. A queue-full
    /// transport is retried (polling in between) until the retry budget runs
    /// out, which yields [`Error::Overloaded`]. Any other enqueue failure
    /// drops the message, marks the broker disconnected and returns
    /// [`Error::Transport`].
    pub fn publish(&self, payload: &[u8], topic: &str, options: PublishOptions) -> Result<usize> {
        if !self.is_running() {
            warn!(topic, state = %self.state(), "Publish on a producer that is not running");
            return Err(Error::Closed);
        }
        if payload.is_empty() {
            warn!(topic, "Rejecting empty payload");
            return Err(Error::InvalidArgument("payload must not be empty".to_string()));
        }

        let key = extract_partition_key(payload, &self.key_field)?;

        let handle = self.topics.lookup(topic).ok_or_else(|| {
            error!(topic, "Publish to unregistered topic");
            Error::Topic(format!("topic '{}' is not registered", topic))
        })?;

        let partition = match options.partition {
            Some(p) if (0..self.partition_count).contains(&p) => p,
            Some(p) => {
                warn!(topic, partition = p, partitions = self.partition_count, "Partition out of range");
                return Err(Error::InvalidArgument(format!(
                    "partition {} out of range, topic has {} partitions",
                    p, self.partition_count
                )));
            }
            None => self
                .partitioner
                .select(handle.name(), key.as_bytes(), self.partition_count, 0),
        };

        match self.enqueue_with_backpressure(&handle, partition, payload, options.timeout) {
            Ok(()) => {
                self.health.mark_connected();
                debug!(topic, partition, bytes = payload.len(), "Message enqueued");
                Ok(payload.len())
            }
            Err(Error::Transport(e)) => {
                error!(topic, partition, error = %e, "Produce failed");
                self.health.mark_disconnected();
                Err(Error::Transport(e))
            }
            Err(e) => Err(e),
        }
    }

    fn enqueue_with_backpressure(
        &self,
        handle: &TopicHandle,
        partition: i32,
        payload: &[u8],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let deadline = match (self.backpressure.deadline(), timeout) {
            (Some(configured), Some(hint)) => Some(configured.min(hint)),
            (configured, hint) => configured.or(hint),
        };
        let epoch = self.cancel_epoch.load(Ordering::Acquire);
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.transport.enqueue(handle.name(), partition, payload) {
                Ok(()) => return Ok(()),
                Err(EnqueueError::Rejected(e)) => return Err(Error::Transport(e)),
                Err(EnqueueError::QueueFull) => {
                    let waited = started.elapsed();
                    let retries_exhausted = self
                        .backpressure
                        .max_retries
                        .is_some_and(|max| attempts > max);
                    if retries_exhausted || deadline.is_some_and(|d| waited >= d) {
                        warn!(
                            topic = handle.name(),
                            attempts,
                            waited_ms = waited.as_millis() as u64,
                            "Outbound queue still full, giving up"
                        );
                        return Err(Error::Overloaded { attempts, waited });
                    }
                    if self.cancelled_since(epoch) || !self.is_running() {
                        debug!(topic = handle.name(), attempts, "Backpressure retry cancelled");
                        return Err(Error::Cancelled);
                    }
                    debug!(topic = handle.name(), attempts, "Outbound queue full, polling");
                    self.transport.poll(self.backpressure.poll_interval());
                }
            }
        }
    }

    /// Serves delivery reports and broker events. Call periodically, or use
    /// [`Producer::spawn_poller`].
    pub fn poll(&self, timeout: Duration) {
        self.transport.poll(timeout);
    }

    /// Aborts the backpressure retries and the close drain that are running
    /// right now. Work started after this call is unaffected.
    pub fn cancel(&self) {
        self.cancel_epoch.fetch_add(1, Ordering::AcqRel);
    }

    fn cancelled_since(&self, epoch: u64) -> bool {
        self.cancel_epoch.load(Ordering::Acquire) != epoch
    }

    /// Drains the outbound queue and releases the transport.
    ///
    /// Blocks until the outstanding depth reads zero, unless a close timeout
    /// is configured or [`Producer::cancel`] is called while it drains. The
    /// producer is closed afterwards either way; closing twice is a no-op.
    pub fn close(&self) -> Result<()> {
        if self
            .lifecycle
            .compare_exchange(RUNNING, CLOSING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(producer_id = self.id, state = %self.state(), "Producer already closing");
            return Ok(());
        }
        info!(producer_id = self.id, "Closing producer");

        let result = self.drain();
        if result.is_ok() {
            if let Err(e) = self.transport.shutdown(SHUTDOWN_WAIT) {
                warn!(error = %e, "Transport did not shut down cleanly");
            }
        }

        self.topics.clear();
        self.lifecycle.store(CLOSED, Ordering::Release);
        info!(producer_id = self.id, "Producer closed");
        result
    }

    fn drain(&self) -> Result<()> {
        let epoch = self.cancel_epoch.load(Ordering::Acquire);
        let started = Instant::now();
        loop {
            let outstanding = self.transport.outstanding();
            if outstanding == 0 {
                return Ok(());
            }
            if self.cancelled_since(epoch) {
                warn!(outstanding, "Close drain cancelled");
                return Err(Error::Cancelled);
            }
            if let Some(limit) = self.close_timeout {
                if started.elapsed() >= limit {
                    warn!(outstanding, "Close drain timed out");
                    return Err(Error::Timeout { outstanding });
                }
            }
            info!(outstanding, "Waiting for outstanding messages");
            self.transport.poll(CLOSE_POLL_INTERVAL);
        }
    }

    fn is_running(&self) -> bool {
        self.lifecycle.load(Ordering::Acquire) == RUNNING
    }

    /// Starts a thread that polls the transport every `interval` until the
    /// returned [`Poller`] is stopped or the producer closes.
    pub fn spawn_poller(self: &Arc<Self>, interval: Duration) -> Result<Poller> {
        let producer = Arc::clone(self);
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name(format!("kafka-poll-{}", self.id))
            .spawn(move || {
                debug!(producer_id = producer.id, "Poll thread started");
                while !thread_stop.load(Ordering::Relaxed)
                    && producer.lifecycle.load(Ordering::Acquire) != CLOSED
                {
                    producer.poll(interval);
                }
                debug!(producer_id = producer.id, "Poll thread stopped");
            })
            .map_err(Error::Io)?;

        Ok(Poller {
            stop,
            handle: Some(handle),
        })
    }
}

impl<T: Transport> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("partition_count", &self.partition_count)
            .field("topics", &self.topics.len())
            .finish_non_exhaustive()
    }
}

/// Handle to a background poll thread. Stops the thread when dropped.
pub struct Poller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Poller {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
