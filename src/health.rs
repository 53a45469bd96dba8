//! Broker reachability tracking.
//!
//! [`HealthState`] holds the connected/disconnected flag shared between the
//! publish path and the transport callbacks. Every observed transition is
//! forwarded to a [`StatusRegistry`] from a dedicated notifier thread, so a
//! slow registry never stalls a publish or a librdkafka callback.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// External host-status registry keyed by component identifier.
pub trait StatusRegistry: Send + Sync + 'static {
    fn update_host_status(&self, component: &str, up: bool);
}

/// Registry that only writes transitions to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStatusRegistry;

impl StatusRegistry for LoggingStatusRegistry {
    fn update_host_status(&self, component: &str, up: bool) {
        info!(component, up, "Host status changed");
    }
}

/// Point-in-time view of the health state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub component: String,
    pub connected: bool,
    pub transitions: u64,
    pub last_transition: Option<DateTime<Utc>>,
    pub delivered: u64,
    pub delivery_failures: u64,
}

pub struct HealthState {
    component: String,
    connected: AtomicBool,
    transitions: AtomicU64,
    delivered: AtomicU64,
    delivery_failures: AtomicU64,
    // Guards flag flip + enqueue so the registry sees changes in flag order.
    last_transition: Mutex<Option<DateTime<Utc>>>,
    notifier: mpsc::UnboundedSender<bool>,
}

impl HealthState {
    /// Creates the state in the disconnected position and starts the
    /// notifier thread. The thread exits once the state is dropped.
    pub fn new(component: impl Into<String>, registry: Arc<dyn StatusRegistry>) -> Result<Arc<Self>> {
        let component = component.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<bool>();

        let thread_component = component.clone();
        std::thread::Builder::new()
            .name("health-notifier".to_string())
            .spawn(move || {
                while let Some(up) = rx.blocking_recv() {
                    registry.update_host_status(&thread_component, up);
                }
                debug!(component = %thread_component, "Health notifier stopped");
            })
            .map_err(Error::Io)?;

        Ok(Arc::new(Self {
            component,
            connected: AtomicBool::new(false),
            transitions: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
            last_transition: Mutex::new(None),
            notifier: tx,
        }))
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Publishes the current state unconditionally. Used once when the
    /// producer starts initializing so the registry has a baseline.
    pub fn announce(&self) {
        let _guard = self.lock();
        self.notify(self.connected.load(Ordering::Acquire));
    }

    /// Returns true if this call flipped the flag.
    pub fn mark_connected(&self) -> bool {
        self.transition(true)
    }

    /// Returns true if this call flipped the flag.
    pub fn mark_disconnected(&self) -> bool {
        self.transition(false)
    }

    pub fn record_delivery(&self, success: bool) {
        if success {
            self.delivered.fetch_add(1, Ordering::Relaxed);
        } else {
            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last_transition = *self.lock();
        HealthSnapshot {
            component: self.component.clone(),
            connected: self.is_connected(),
            transitions: self.transitions.load(Ordering::Relaxed),
            last_transition,
            delivered: self.delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }

    fn transition(&self, up: bool) -> bool {
        // Fast path: no lock when the flag already holds the target value.
        if self.connected.load(Ordering::Acquire) == up {
            return false;
        }

        let mut last = self.lock();
        if self
            .connected
            .compare_exchange(!up, up, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        *last = Some(Utc::now());
        self.transitions.fetch_add(1, Ordering::Relaxed);
        if up {
            info!(component = %self.component, "Broker connection restored");
        } else {
            warn!(component = %self.component, "Broker connection lost");
        }
        self.notify(up);
        true
    }

    fn notify(&self, up: bool) {
        if self.notifier.send(up).is_err() {
            warn!(component = %self.component, up, "Health notifier is gone, dropping status update");
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<DateTime<Utc>>> {
        self.last_transition
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthState")
            .field("component", &self.component)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
