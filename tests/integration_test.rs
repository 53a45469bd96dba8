mod common;

use common::{get_test_config, test_topic, RecordingRegistry};
use kafka_publisher::kafka::{HashPartitioner, Partitioner};
use kafka_publisher::{Error, Producer, ProducerState, PublishOptions};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::Message;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[test]
fn test_init_rejects_invalid_config() {
    let registry = Arc::new(RecordingRegistry::default());
    let result = Producer::init(&get_test_config().with_partitions(0), registry.clone());

    assert!(matches!(result, Err(Error::Config(_))));
    assert_eq!(registry.wait_for(1), vec![false]);
}

#[test]
fn test_init_rejects_unknown_client_property() {
    let mut config = get_test_config();
    config
        .extra
        .insert("definitely.not.a.property".to_string(), "1".to_string());

    let result = Producer::init(&config, Arc::new(RecordingRegistry::default()));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[tokio::test]
#[ignore] // Requires running Kafka
async fn test_publish_and_consume() {
    tracing_subscriber::fmt()
        .with_env_filter("kafka_publisher=debug")
        .try_init()
        .ok();

    let config = get_test_config();
    let registry = Arc::new(RecordingRegistry::default());
    let producer = Arc::new(Producer::init(&config, registry.clone()).unwrap());
    assert_eq!(producer.state(), ProducerState::Connected);

    let topic = test_topic("orders");
    producer.register(&topic).unwrap();
    let poller = producer.spawn_poller(Duration::from_millis(50)).unwrap();

    let consumer = create_consumer(&config.brokers, &topic);

    let mut expected_partitions = Vec::new();
    for i in 0..10 {
        let key = format!("cust-{}", i);
        let payload = serde_json::to_vec(&json!({"key": key, "seq": i})).unwrap();
        let bytes = producer
            .publish(&payload, &topic, PublishOptions::default())
            .unwrap();
        assert_eq!(bytes, payload.len());
        expected_partitions.push((i, HashPartitioner.select(&topic, key.as_bytes(), 4, 0)));
    }

    poller.stop();
    producer.close().unwrap();
    assert_eq!(producer.state(), ProducerState::Closed);
    assert_eq!(producer.health().delivered, 10);

    let mut received = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while received.len() < 10 && tokio::time::Instant::now() < deadline {
        if let Ok(Ok(message)) = timeout(Duration::from_secs(1), consumer.recv()).await {
            let json: Value = serde_json::from_slice(message.payload().unwrap()).unwrap();
            received.push((json["seq"].as_i64().unwrap(), message.partition()));
        }
    }

    assert_eq!(received.len(), 10);
    for (seq, partition) in expected_partitions {
        assert!(received.contains(&(seq as i64, partition)));
    }
}

#[tokio::test]
#[ignore] // Requires a topic with fewer partitions than configured
async fn test_unknown_partition_marks_disconnected() {
    let mut config = get_test_config();
    config.partitions = 64;
    let registry = Arc::new(RecordingRegistry::default());
    let producer = Producer::init(&config, registry.clone()).unwrap();

    let topic = test_topic("small");
    producer.register(&topic).unwrap();
    let payload = serde_json::to_vec(&json!({"key": "cust-1"})).unwrap();

    // Delivery to a partition the broker does not have fails asynchronously.
    let _ = producer.publish(&payload, &topic, PublishOptions::default().partition(63));
    for _ in 0..30 {
        producer.poll(Duration::from_millis(500));
        if !producer.is_connected() {
            break;
        }
    }

    assert!(!producer.is_connected());
    assert_eq!(producer.health().delivery_failures, 1);
}

fn create_consumer(brokers: &[String], topic: &str) -> StreamConsumer {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", brokers.join(","))
        .set("group.id", format!("kafka-publisher-test-{}", std::process::id()))
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false")
        .create()
        .unwrap();

    consumer.subscribe(&[topic]).unwrap();
    consumer
}
