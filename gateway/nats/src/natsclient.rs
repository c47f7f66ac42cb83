use std::time::Duration;

use abstractgateway::subjects;
use abstractgateway::{BrokerMessage, BrokerTransport, MessageStream, TransportError, TransportResult};
use async_nats::{Client, ConnectOptions, RequestErrorKind};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub url: String,
    /// Connection name shown in the server's monitoring endpoints.
    pub client_name: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://nats:4222".to_string(),
            client_name: "telemetry".to_string(),
        }
    }
}

/// Shared NATS connection. Cloning is cheap; all clones use one socket.
#[derive(Clone, Debug)]
pub struct NatsBroker {
    client: Client,
}

impl NatsBroker {
    /// Connects once. Failure is returned immediately so callers can fail fast.
    pub async fn connect(cfg: &NatsConfig) -> TransportResult<Self> {
        let client = ConnectOptions::new()
            .name(&cfg.client_name)
            .request_timeout(None)
            .event_callback(|event| async move {
                warn!("NATS connection event: {event}");
            })
            .connect(cfg.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(format!("{}: {e}", cfg.url)))?;

        info!(url = %cfg.url, name = %cfg.client_name, "connected to NATS");
        Ok(Self { client })
    }

    fn into_stream(subscriber: async_nats::Subscriber) -> MessageStream {
        Box::pin(subscriber.map(|m| BrokerMessage {
            subject: m.subject.to_string(),
            payload: m.payload.to_vec(),
            reply: m.reply.map(|r| r.to_string()),
        }))
    }
}

#[async_trait]
impl BrokerTransport for NatsBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> TransportResult<()> {
        subjects::validate_subject(subject)?;
        self.client
            .publish(subject.to_string(), Bytes::from(payload))
            .await
            .map_err(|e| TransportError::Publish {
                subject: subject.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, pattern: &str) -> TransportResult<MessageStream> {
        subjects::validate_pattern(pattern)?;
        let subscriber = self
            .client
            .subscribe(pattern.to_string())
            .await
            .map_err(|e| TransportError::Subscribe {
                subject: pattern.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::into_stream(subscriber))
    }

    async fn queue_subscribe(&self, pattern: &str, group: &str) -> TransportResult<MessageStream> {
        subjects::validate_pattern(pattern)?;
        let subscriber = self
            .client
            .queue_subscribe(pattern.to_string(), group.to_string())
            .await
            .map_err(|e| TransportError::Subscribe {
                subject: format!("{pattern} (group {group})"),
                reason: e.to_string(),
            })?;
        Ok(Self::into_stream(subscriber))
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> TransportResult<Vec<u8>> {
        subjects::validate_subject(subject)?;
        let call = self.client.request(subject.to_string(), Bytes::from(payload));

        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(msg)) => Ok(msg.payload.to_vec()),
            Ok(Err(e)) => Err(match e.kind() {
                RequestErrorKind::TimedOut => TransportError::Timeout {
                    subject: subject.to_string(),
                    timeout,
                },
                RequestErrorKind::NoResponders => TransportError::NoResponders(subject.to_string()),
                _ => TransportError::Request {
                    subject: subject.to_string(),
                    reason: e.to_string(),
                },
            }),
            Err(_) => Err(TransportError::Timeout {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }

    async fn flush(&self) -> TransportResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| TransportError::Publish {
                subject: "<flush>".to_string(),
                reason: e.to_string(),
            })
    }
}
