//! Reply side of the query protocol.
//!
//! Subscribes to the request subject, dispatches on `query_type` and always
//! answers with exactly one [`ReaderResponse`]. What a query computes is up
//! to the registered [`QueryHandler`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use abstractgateway::{BrokerMessage, BrokerTransport, ReaderRequest, ReaderResponse, ResponseStatus};
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::traits::{MessagingService, ServiceError, ServiceResult, ServiceStatus};

#[async_trait]
pub trait QueryHandler: Send + Sync {
    async fn handle(&self, params: &Map<String, Value>) -> Result<Value, String>;
}

/// Adapts a plain closure into a [`QueryHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F> QueryHandler for FnHandler<F>
where
    F: Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync,
{
    async fn handle(&self, params: &Map<String, Value>) -> Result<Value, String> {
        (self.0)(params)
    }
}

#[derive(Default)]
struct Counters {
    served: AtomicU64,
    errors: AtomicU64,
}

#[derive(Clone)]
pub struct QueryResponder {
    broker: Arc<dyn BrokerTransport>,
    subject: String,
    handlers: Arc<HashMap<String, Arc<dyn QueryHandler>>>,
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
}

impl QueryResponder {
    pub fn new(broker: Arc<dyn BrokerTransport>, subject: impl Into<String>) -> Self {
        Self {
            broker,
            subject: subject.into(),
            handlers: Arc::new(HashMap::new()),
            counters: Arc::new(Counters::default()),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn register(mut self, query_type: impl Into<String>, handler: Arc<dyn QueryHandler>) -> Self {
        Arc::make_mut(&mut self.handlers).insert(query_type.into(), handler);
        self
    }

    pub fn register_fn<F>(self, query_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(query_type, Arc::new(FnHandler(f)))
    }

    /// Builds the reply for one raw request body. Never fails.
    pub async fn respond_to(&self, payload: &[u8]) -> ReaderResponse {
        let request: ReaderRequest = match serde_json::from_slice(payload) {
            Ok(r) => r,
            Err(e) => return ReaderResponse::error(format!("invalid request: {e}")),
        };

        let Some(handler) = self.handlers.get(&request.query_type) else {
            return ReaderResponse::error(format!("Unknown query_type: {}", request.query_type));
        };

        match handler.handle(&request.params).await {
            Ok(data) => ReaderResponse::success(data),
            Err(message) => ReaderResponse::error(message),
        }
    }

    async fn reply(&self, msg: BrokerMessage) {
        let Some(reply_to) = msg.reply.as_deref() else {
            warn!(subject = %msg.subject, "request without reply subject ignored");
            return;
        };

        let response = self.respond_to(&msg.payload).await;
        self.counters.served.fetch_add(1, Ordering::Relaxed);
        if response.status == ResponseStatus::Error {
            self.counters.errors.fetch_add(1, Ordering::Relaxed);
        }
        let body = match serde_json::to_vec(&response) {
            Ok(b) => b,
            Err(e) => {
                error!(error = %e, "failed to encode response");
                return;
            }
        };

        match self.broker.publish(reply_to, body).await {
            Ok(()) => debug!(reply = reply_to, status = ?response.status, "query answered"),
            Err(e) => error!(reply = reply_to, error = %e, "failed to publish response"),
        }
    }
}

#[async_trait]
impl MessagingService for QueryResponder {
    fn name(&self) -> &str {
        "query-responder"
    }

    async fn run(&self, shutdown: CancellationToken) -> ServiceResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }

        let mut requests = match self.broker.subscribe(&self.subject).await {
            Ok(s) => s,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        };
        info!(subject = %self.subject, queries = self.handlers.len(), "query responder subscribed");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                next = requests.next() => {
                    let Some(msg) = next else { break };
                    let this = self.clone();
                    tokio::spawn(async move { this.reply(msg).await });
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(subject = %self.subject, "query responder stopped");
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        let mut status = ServiceStatus::new(self.name());
        status.running = self.running.load(Ordering::SeqCst);
        status.processed_count = self.counters.served.load(Ordering::Relaxed);
        status.error_count = self.counters.errors.load(Ordering::Relaxed);
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abstractgateway::subjects::READER_QUERY;
    use abstractgateway::InMemoryBroker;
    use serde_json::json;
    use std::time::Duration;

    fn responder(broker: Arc<InMemoryBroker>) -> QueryResponder {
        QueryResponder::new(broker, READER_QUERY).register_fn("device_health", |params| {
            match params.get("source_device") {
                Some(_) => Ok(json!({ "health": "ok" })),
                None => Err("source_device is required".to_string()),
            }
        })
    }

    #[tokio::test]
    async fn test_dispatch_on_query_type() {
        let r = responder(Arc::new(InMemoryBroker::new()));

        let ok = r.respond_to(br#"{"query_type":"device_health","params":{"source_device":"sensor-1"}}"#).await;
        assert_eq!(ok, ReaderResponse::success(json!({ "health": "ok" })));

        let missing = r.respond_to(br#"{"query_type":"device_health"}"#).await;
        assert_eq!(missing.message.as_deref(), Some("source_device is required"));

        let unknown = r.respond_to(br#"{"query_type":"forecast","params":{}}"#).await;
        assert_eq!(unknown.message.as_deref(), Some("Unknown query_type: forecast"));
    }

    #[tokio::test]
    async fn test_malformed_request_gets_error_reply() {
        let r = responder(Arc::new(InMemoryBroker::new()));
        let resp = r.respond_to(b"{{").await;
        assert_eq!(resp.status, ResponseStatus::Error);
        assert!(resp.message.unwrap().starts_with("invalid request: "));
    }

    #[tokio::test]
    async fn test_request_reply_over_broker() {
        let broker = Arc::new(InMemoryBroker::new());
        let r = responder(broker.clone());
        let token = CancellationToken::new();
        let task = {
            let r = r.clone();
            let token = token.clone();
            tokio::spawn(async move { r.run(token).await })
        };
        while broker.subscription_count().await == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let body = serde_json::to_vec(&ReaderRequest::new("device_health").param("source_device", "x")).unwrap();
        let reply = broker.request(READER_QUERY, body, Duration::from_secs(1)).await.unwrap();
        let resp: ReaderResponse = serde_json::from_slice(&reply).unwrap();
        assert_eq!(resp.status, ResponseStatus::Success);

        // no reply subject: ignored, responder keeps serving
        broker.publish(READER_QUERY, b"{}".to_vec()).await.unwrap();
        let again = serde_json::to_vec(&ReaderRequest::new("nope")).unwrap();
        let reply = broker.request(READER_QUERY, again, Duration::from_secs(1)).await.unwrap();
        let resp: ReaderResponse = serde_json::from_slice(&reply).unwrap();
        assert_eq!(resp.message.as_deref(), Some("Unknown query_type: nope"));

        token.cancel();
        task.await.unwrap().unwrap();
        let status = r.status();
        assert_eq!(status.processed_count, 2);
        assert_eq!(status.error_count, 1);
        assert!(!status.running);
    }
}
