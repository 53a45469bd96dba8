use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, error, info, instrument};

/// Reference to a registered topic, bound to the producer that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    name: Arc<str>,
    producer_id: u64,
}

impl TopicHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer_id(&self) -> u64 {
        self.producer_id
    }
}

/// One handle per topic name. Handles are only added; the whole registry is
/// cleared when the owning producer closes.
#[derive(Debug)]
pub struct TopicRegistry {
    producer_id: u64,
    topics: RwLock<HashMap<String, TopicHandle>>,
}

impl TopicRegistry {
    pub fn new(producer_id: u64) -> Self {
        Self {
            producer_id,
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Registers `topic_name`, calling `create` to prepare the transport side.
    ///
    /// The write lock is held across `create`, so concurrent registrations of
    /// the same name cannot both succeed and a lookup never sees a half-built
    /// entry. Nothing is inserted if `create` fails.
    #[instrument(skip(self, create), fields(topic = %topic_name))]
    pub fn register<F>(&self, topic_name: &str, create: F) -> Result<TopicHandle>
    where
        F: FnOnce(&str) -> std::result::Result<(), String>,
    {
        if topic_name.is_empty() {
            return Err(Error::Topic("topic name must not be empty".to_string()));
        }

        let mut topics = self.write();
        if topics.contains_key(topic_name) {
            debug!("Topic '{}' already registered", topic_name);
            return Err(Error::Topic(format!("topic '{}' is already registered", topic_name)));
        }

        create(topic_name).map_err(|reason| {
            error!(reason = %reason, "Failed to create topic '{}'", topic_name);
            Error::Topic(format!("failed to create topic '{}': {}", topic_name, reason))
        })?;

        let handle = TopicHandle {
            name: Arc::from(topic_name),
            producer_id: self.producer_id,
        };
        topics.insert(topic_name.to_string(), handle.clone());
        info!("Registered topic '{}'", topic_name);
        Ok(handle)
    }

    pub fn lookup(&self, topic_name: &str) -> Option<TopicHandle> {
        self.read().get(topic_name).cloned()
    }

    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn clear(&self) {
        self.write().clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, TopicHandle>> {
        self.topics.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, TopicHandle>> {
        self.topics.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn accept(_: &str) -> std::result::Result<(), String> {
        Ok(())
    }

    #[test]
    fn test_register_then_lookup() {
        let registry = TopicRegistry::new(7);
        let handle = registry.register("orders", accept).unwrap();

        assert_eq!(handle.name(), "orders");
        assert_eq!(handle.producer_id(), 7);
        assert_eq!(registry.lookup("orders"), Some(handle));
        assert_eq!(registry.lookup("payments"), None);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = TopicRegistry::new(1);
        registry.register("orders", accept).unwrap();

        let err = registry.register("orders", accept).unwrap_err();
        assert!(matches!(err, Error::Topic(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_empty_name_fails() {
        let registry = TopicRegistry::new(1);
        assert!(matches!(registry.register("", accept), Err(Error::Topic(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_create_failure_has_no_side_effect() {
        let registry = TopicRegistry::new(1);
        let result = registry.register("bad/name", |_| Err("illegal character".to_string()));

        assert!(matches!(result, Err(Error::Topic(_))));
        assert_eq!(registry.lookup("bad/name"), None);
        assert!(registry.register("bad/name", accept).is_ok());
    }

    #[test]
    fn test_lookup_never_creates() {
        let registry = TopicRegistry::new(1);
        assert_eq!(registry.lookup("orders"), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_registration_single_winner() {
        let registry = Arc::new(TopicRegistry::new(1));
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let created = created.clone();
                std::thread::spawn(move || {
                    registry
                        .register("orders", |_| {
                            created.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_topics_sorted_and_clear() {
        let registry = TopicRegistry::new(1);
        registry.register("payments", accept).unwrap();
        registry.register("orders", accept).unwrap();

        assert_eq!(registry.topics(), vec!["orders".to_string(), "payments".to_string()]);
        registry.clear();
        assert!(registry.is_empty());
    }
}
