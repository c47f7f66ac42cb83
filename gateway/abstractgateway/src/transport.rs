use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::subjects::SubjectError;

/// A message as delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Concrete subject the message was published on.
    pub subject: String,
    pub payload: Vec<u8>,
    /// Implicit reply subject set by request/reply callers.
    pub reply: Option<String>,
}

impl BrokerMessage {
    pub fn new(subject: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            subject: subject.into(),
            payload: payload.into(),
            reply: None,
        }
    }

    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    /// Payload as text, lossy. Meant for log lines.
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Stream of deliveries for one subscription. Dropping it unsubscribes.
pub type MessageStream = Pin<Box<dyn Stream<Item = BrokerMessage> + Send>>;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("publish to '{subject}' failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("subscribe to '{subject}' failed: {reason}")]
    Subscribe { subject: String, reason: String },
    #[error("request on '{subject}' timed out after {timeout:?}")]
    Timeout { subject: String, timeout: Duration },
    #[error("no responders for '{0}'")]
    NoResponders(String),
    #[error("request on '{subject}' failed: {reason}")]
    Request { subject: String, reason: String },
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Subject(#[from] SubjectError),
}

impl TransportError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Broker operations the messaging core relies on.
///
/// Implementations must be safe for concurrent use: one instance is shared
/// by every handler in a process.
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Fire-and-forget publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> TransportResult<()>;

    /// Fan-out subscription: every subscriber on a matching pattern receives the message.
    async fn subscribe(&self, pattern: &str) -> TransportResult<MessageStream>;

    /// Competing-consumer subscription: exactly one member of `group` receives each message.
    async fn queue_subscribe(&self, pattern: &str, group: &str) -> TransportResult<MessageStream>;

    /// Publishes `payload` with an implicit reply subject and waits up to
    /// `timeout` for exactly one reply.
    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> TransportResult<Vec<u8>>;

    /// Flushes buffered publishes. Default is a no-op.
    async fn flush(&self) -> TransportResult<()> {
        Ok(())
    }
}
