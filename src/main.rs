use anyhow::Context;
use clap::Parser;
use kafka_publisher::{Config, LoggingStatusRegistry, Producer, PublishOptions};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "kafka-publisher")]
#[command(about = "Publish JSON lines from stdin to a Kafka topic", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Topic to publish to")]
    topic: String,

    #[arg(long, default_value_t = 100, help = "Background poll interval in milliseconds")]
    poll_interval_ms: u64,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting kafka-publisher");
    info!("Loading configuration from {:?}", args.config);

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load configuration from {:?}", args.config))?;

    info!(
        kafka_brokers = ?config.kafka.brokers,
        kafka_partitions = config.kafka.partitions,
        kafka_mode = ?config.kafka.mode,
        partition_key_field = %config.kafka.partition_key_field,
        topic = %args.topic,
        "Configuration summary"
    );

    let producer = Arc::new(Producer::init(&config.kafka, Arc::new(LoggingStatusRegistry))?);
    producer.register(&args.topic)?;
    let poller = producer.spawn_poller(Duration::from_millis(args.poll_interval_ms))?;

    let publisher = producer.clone();
    let topic = args.topic.clone();
    let mut publishing = tokio::task::spawn_blocking(move || publish_stdin(&publisher, &topic));

    let mut interrupted = false;
    let (published, failed) = tokio::select! {
        result = &mut publishing => result.context("publisher task panicked")??,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            // Unblocks a publish stuck on a full queue.
            producer.cancel();
            interrupted = true;
            (0, 0)
        }
    };

    if interrupted {
        let canceller = producer.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Second interrupt, abandoning outstanding messages");
                canceller.cancel();
            }
        });
    }

    poller.stop();
    if let Err(e) = producer.close() {
        warn!(error = %e, "Producer did not close cleanly");
    }

    let health = producer.health();
    info!(
        published,
        failed,
        delivered = health.delivered,
        delivery_failures = health.delivery_failures,
        "kafka-publisher finished"
    );

    if interrupted {
        // The stdin reader is still parked in a blocking read the runtime would wait on.
        std::process::exit(130);
    }
    Ok(())
}

fn publish_stdin(producer: &Producer, topic: &str) -> kafka_publisher::Result<(u64, u64)> {
    let mut published = 0u64;
    let mut failed = 0u64;

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match producer.publish(line.as_bytes(), topic, PublishOptions::default()) {
            Ok(_) => published += 1,
            Err(kafka_publisher::Error::Cancelled | kafka_publisher::Error::Closed) => break,
            Err(e) => {
                error!(error = %e, "Dropping line");
                failed += 1;
            }
        }
    }

    Ok((published, failed))
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("kafka_publisher=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kafka_publisher=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
