use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use messaging::observability::{init_tracing, shutdown_token};
use messaging::{MessagingService, ProducerConfig, TelemetryProducer};
use natsgateway::{NatsBroker, NatsConfig};
use tracing::info;

/// Publishes simulated device metrics and events.
#[derive(Parser, Debug)]
#[command(name = "daemon", version)]
struct Args {
    #[arg(long, env = "NATS_URL", default_value = "nats://nats:4222")]
    nats_url: String,

    /// Seconds between generation cycles; invalid or non-positive means 1.
    #[arg(long, env = "GENERATION_INTERVAL_SECONDS")]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let broker = NatsBroker::connect(&NatsConfig {
        url: args.nats_url.clone(),
        client_name: "daemon".to_string(),
    })
    .await
    .with_context(|| format!("connecting to NATS at {}", args.nats_url))?;

    let cfg = ProducerConfig {
        interval: ProducerConfig::interval_from_env(args.interval.as_deref()),
        ..ProducerConfig::default()
    };
    let producer = TelemetryProducer::new(Arc::new(broker), cfg);
    producer.run(shutdown_token()).await.context("producer failed")?;
    info!("daemon stopped");
    Ok(())
}
