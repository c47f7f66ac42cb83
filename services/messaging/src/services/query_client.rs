//! Sequential request/reply query client.
//!
//! Sends each [`ReaderRequest`] on the request subject, waits for exactly
//! one reply or the timeout, and appends a readable block per query to the
//! log sink. A failed query is logged and skipped; the sequence never aborts.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use abstractgateway::subjects::READER_QUERY;
use abstractgateway::{BrokerTransport, ReaderRequest, ReaderResponse, TransportError};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::logsink::LogSink;

#[derive(Debug, Clone)]
pub struct QueryClientConfig {
    pub subject: String,
    pub timeout: Duration,
    /// Pause between consecutive queries.
    pub delay: Duration,
}

impl Default for QueryClientConfig {
    fn default() -> Self {
        Self {
            subject: READER_QUERY.to_string(),
            timeout: Duration::from_secs(10),
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Request failed: {0}")]
    Request(#[from] TransportError),
    #[error("Failed to parse response: {0}")]
    Deserialize(#[source] serde_json::Error),
}

#[derive(Debug)]
pub enum QueryOutcome {
    Success(Value),
    /// The service answered with `status: "error"`.
    ErrorReply(String),
    Failed(QueryError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryRunSummary {
    pub succeeded: usize,
    pub error_replies: usize,
    pub failed: usize,
}

impl QueryRunSummary {
    fn record(&mut self, outcome: &QueryOutcome) {
        match outcome {
            QueryOutcome::Success(_) => self.succeeded += 1,
            QueryOutcome::ErrorReply(_) => self.error_replies += 1,
            QueryOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// The query set sent when no queries file is configured.
pub fn default_queries() -> Vec<ReaderRequest> {
    vec![
        ReaderRequest::new("alerts_critical")
            .param("since_minutes", 15)
            .param("min_criticality", 8),
        ReaderRequest::new("device_health").param("source_device", "sensor-1"),
        ReaderRequest::new("anomaly_temperature")
            .param("source_device", "sensor-1")
            .param("threshold", 1.3)
            .param("window_minutes", 20),
    ]
}

/// Reads a JSON array of requests.
pub async fn load_queries(path: &Path) -> anyhow::Result<Vec<ReaderRequest>> {
    use anyhow::Context;

    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading queries file {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing queries file {}", path.display()))
}

/// Two-space indented JSON; object keys come out sorted.
pub fn pretty(data: &Value) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
}

pub struct QueryClient {
    broker: Arc<dyn BrokerTransport>,
    sink: LogSink,
    cfg: QueryClientConfig,
}

impl QueryClient {
    pub fn new(broker: Arc<dyn BrokerTransport>, sink: LogSink, cfg: QueryClientConfig) -> Self {
        Self { broker, sink, cfg }
    }

    pub async fn run(&self, queries: &[ReaderRequest]) -> QueryRunSummary {
        let mut summary = QueryRunSummary::default();
        for (i, request) in queries.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.cfg.delay).await;
            }
            let outcome = self.send_query(request).await;
            summary.record(&outcome);
        }
        info!(
            succeeded = summary.succeeded,
            error_replies = summary.error_replies,
            failed = summary.failed,
            "query run finished"
        );
        summary
    }

    pub async fn send_query(&self, request: &ReaderRequest) -> QueryOutcome {
        let outcome = match self.exchange(request).await {
            Ok(resp) => match resp.into_result() {
                Ok(data) => QueryOutcome::Success(data),
                Err(message) => QueryOutcome::ErrorReply(message),
            },
            Err(e) => QueryOutcome::Failed(e),
        };

        let entry = match &outcome {
            QueryOutcome::Success(data) => format!("{}\n{}", request.query_type, pretty(data)),
            QueryOutcome::ErrorReply(message) => format!("{}\nError: {}", request.query_type, message),
            QueryOutcome::Failed(e) => {
                warn!(query_type = %request.query_type, error = %e, "query failed");
                e.to_string()
            }
        };
        self.sink.append_or_report(&entry).await;
        outcome
    }

    async fn exchange(&self, request: &ReaderRequest) -> Result<ReaderResponse, QueryError> {
        let body = serde_json::to_vec(request).map_err(QueryError::Serialize)?;
        let reply = self.broker.request(&self.cfg.subject, body, self.cfg.timeout).await?;
        serde_json::from_slice(&reply).map_err(QueryError::Deserialize)
    }
}
