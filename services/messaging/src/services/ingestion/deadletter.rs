//! Dead-letter publishing for messages that could not be persisted.

use std::sync::Arc;

use abstractgateway::subjects::dead_letter_subject;
use abstractgateway::{BrokerMessage, BrokerTransport, TransportResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body republished on `deadletter.<subject>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    pub subject: String,
    /// Original payload, lossy UTF-8.
    pub payload: String,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(msg: &BrokerMessage, error: impl ToString) -> Self {
        Self {
            subject: msg.subject.clone(),
            payload: msg.payload_text(),
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait DeadLetter: Send + Sync {
    async fn send(&self, record: DeadLetterRecord) -> TransportResult<()>;
}

/// Publishes records back onto the broker.
pub struct BrokerDeadLetter {
    broker: Arc<dyn BrokerTransport>,
}

impl BrokerDeadLetter {
    pub fn new(broker: Arc<dyn BrokerTransport>) -> Self {
        Self { broker }
    }
}

#[async_trait]
impl DeadLetter for BrokerDeadLetter {
    async fn send(&self, record: DeadLetterRecord) -> TransportResult<()> {
        let subject = dead_letter_subject(&record.subject);
        // DeadLetterRecord holds only strings and a timestamp
        let body = serde_json::to_vec(&record).unwrap_or_default();
        self.broker.publish(&subject, body).await
    }
}
