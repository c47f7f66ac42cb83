use std::sync::Arc;
use std::time::Duration;

use abstractdatabase::{PointWriter, RetryPolicy, RetryingWriter};
use abstractgateway::subjects::WRITER_QUEUE_GROUP;
use abstractgateway::BrokerTransport;
use anyhow::{Context, Result};
use clap::Parser;
use influxdb::{InfluxClient, InfluxConfig, DEFAULT_INFLUXDB_HOST};
use messaging::observability::{init_tracing, shutdown_token};
use messaging::{BrokerDeadLetter, IngestHandler, IngestionConfig, IngestionConsumer, MessagingService, SubjectRouter};
use natsgateway::{NatsBroker, NatsConfig};
use tracing::{info, warn};

/// Ingestion writer: consumes `events.*` and stores points in InfluxDB.
#[derive(Parser, Debug)]
#[command(name = "writer", version)]
struct Args {
    #[arg(long, env = "NATS_URL", default_value = "nats://nats:4222")]
    nats_url: String,

    #[arg(long, env = "NATS_QUEUE_GROUP", default_value = WRITER_QUEUE_GROUP)]
    queue_group: String,

    #[arg(long, env = "INFLUXDB_HOST", default_value = DEFAULT_INFLUXDB_HOST)]
    influxdb_host: String,

    #[arg(long, env = "INFLUXDB_TOKEN", hide_env_values = true)]
    influxdb_token: Option<String>,

    #[arg(long, env = "INFLUXDB_ORG")]
    influxdb_org: Option<String>,

    #[arg(long, env = "INFLUXDB_BUCKET")]
    influxdb_bucket: Option<String>,

    #[arg(long, env = "WRITER_WORKERS", default_value_t = 16)]
    workers: usize,

    #[arg(long, env = "WRITER_QUEUE_CAPACITY", default_value_t = 1024)]
    queue_capacity: usize,

    #[arg(long, env = "WRITER_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    shutdown_grace_secs: u64,

    /// Total write attempts per point, first one included.
    #[arg(long, env = "WRITER_RETRY_ATTEMPTS", default_value_t = 3)]
    retry_attempts: u32,

    #[arg(long, env = "WRITER_DEAD_LETTER", default_value_t = true, action = clap::ArgAction::Set)]
    dead_letter: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let influx_cfg = InfluxConfig::from_parts(
        Some(args.influxdb_host.clone()),
        args.influxdb_token.clone(),
        args.influxdb_org.clone(),
        args.influxdb_bucket.clone(),
    )
    .context("missing InfluxDB credentials")?;

    let broker = NatsBroker::connect(&NatsConfig {
        url: args.nats_url.clone(),
        client_name: "writer".to_string(),
    })
    .await
    .with_context(|| format!("connecting to NATS at {}", args.nats_url))?;
    let broker = Arc::new(broker);

    let influx = InfluxClient::connect(influx_cfg).context("building InfluxDB client")?;
    influx
        .health()
        .await
        .with_context(|| format!("InfluxDB health check at {}", args.influxdb_host))?;
    info!(host = %args.influxdb_host, bucket = %influx.config().bucket, "InfluxDB reachable");

    let policy = RetryPolicy {
        max_attempts: args.retry_attempts.max(1),
        ..RetryPolicy::default()
    };
    let writer: Arc<dyn PointWriter> = Arc::new(RetryingWriter::new(influx, policy));

    let mut handler = IngestHandler::new(SubjectRouter::standard(), writer);
    if args.dead_letter {
        handler = handler.with_dead_letter(Arc::new(BrokerDeadLetter::new(broker.clone())));
    }

    let consumer = IngestionConsumer::new(
        broker.clone(),
        Arc::new(handler),
        IngestionConfig {
            queue_group: args.queue_group,
            workers: args.workers,
            queue_capacity: args.queue_capacity,
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
        },
    );

    consumer
        .run(shutdown_token())
        .await
        .context("ingestion consumer failed")?;
    if let Err(e) = broker.flush().await {
        warn!(error = %e, "flushing NATS connection failed");
    }
    info!("writer stopped");
    Ok(())
}
