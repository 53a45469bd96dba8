use kafka_publisher::config::BrokerConfig;
use kafka_publisher::StatusRegistry;
use std::env;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Get test configuration from environment variables
pub fn get_test_config() -> BrokerConfig {
    let brokers = env::var("TEST_KAFKA_BROKERS")
        .unwrap_or_else(|_| "localhost:9092".to_string())
        .split(',')
        .map(|s| s.trim().to_string())
        .collect();

    let mut config = BrokerConfig::new(brokers).with_partitions(4);
    config.client_id = format!("kafka-publisher-test-{}", std::process::id());
    config.queue_buffering_max_ms = 0; // Immediate sending for tests
    config.message_timeout_ms = 10_000;
    config.close_timeout_ms = Some(15_000);
    config
}

/// Unique topic name per test process
pub fn test_topic(name: &str) -> String {
    format!("test_{}_{}", name, std::process::id())
}

/// Status registry that keeps every update for later assertions
#[derive(Default)]
pub struct RecordingRegistry {
    updates: Mutex<Vec<bool>>,
}

impl RecordingRegistry {
    pub fn wait_for(&self, count: usize) -> Vec<bool> {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            let updates = self.updates.lock().unwrap().clone();
            if updates.len() >= count || Instant::now() > deadline {
                return updates;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

impl StatusRegistry for RecordingRegistry {
    fn update_host_status(&self, _component: &str, up: bool) {
        self.updates.lock().unwrap().push(up);
    }
}
