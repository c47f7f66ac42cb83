use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use abstractgateway::subjects::READER_QUERY;
use anyhow::{Context, Result};
use clap::Parser;
use messaging::observability::init_tracing;
use messaging::services::query_client::{default_queries, load_queries};
use messaging::{LogSink, QueryClient, QueryClientConfig};
use natsgateway::{NatsBroker, NatsConfig};
use tracing::info;

/// Sends the query set over request/reply and appends the results to a log file.
#[derive(Parser, Debug)]
#[command(name = "client", version)]
struct Args {
    #[arg(long, env = "NATS_URL", default_value = "nats://nats:4222")]
    nats_url: String,

    #[arg(long, env = "NATS_SUBJECT_REQUEST", default_value = READER_QUERY)]
    subject: String,

    #[arg(long, env = "CLIENT_LOG_FILE", default_value = "client_output.log")]
    log_file: PathBuf,

    /// JSON array of requests replacing the built-in query set.
    #[arg(long, env = "CLIENT_QUERIES_FILE")]
    queries_file: Option<PathBuf>,

    #[arg(long, env = "CLIENT_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    #[arg(long, env = "CLIENT_DELAY_SECS", default_value_t = 1)]
    delay_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing()?;
    let args = Args::parse();

    let queries = match &args.queries_file {
        Some(path) => load_queries(path).await?,
        None => default_queries(),
    };

    let broker = NatsBroker::connect(&NatsConfig {
        url: args.nats_url.clone(),
        client_name: "client".to_string(),
    })
    .await
    .with_context(|| format!("connecting to NATS at {}", args.nats_url))?;
    info!(url = %args.nats_url, queries = queries.len(), "client started");

    let client = QueryClient::new(
        Arc::new(broker),
        LogSink::new(&args.log_file),
        QueryClientConfig {
            subject: args.subject,
            timeout: Duration::from_secs(args.timeout_secs),
            delay: Duration::from_secs(args.delay_secs),
        },
    );
    let summary = client.run(&queries).await;
    info!(
        log_file = %args.log_file.display(),
        succeeded = summary.succeeded,
        error_replies = summary.error_replies,
        failed = summary.failed,
        "client finished"
    );
    Ok(())
}
