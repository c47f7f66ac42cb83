//! In-process broker.
//!
//! Implements the same routing rules the core expects from NATS: wildcard
//! subjects, queue groups (one member per message, round-robin) and
//! request/reply through a private inbox subject. Used by tests and for
//! running the pipeline without an external server.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tracing::trace;
use uuid::Uuid;

use crate::subjects::{self, INBOX_PREFIX};
use crate::transport::{BrokerMessage, BrokerTransport, MessageStream, TransportError, TransportResult};

struct SubscriptionEntry {
    pattern: String,
    group: Option<String>,
    tx: mpsc::UnboundedSender<BrokerMessage>,
}

#[derive(Default)]
struct BrokerState {
    subs: Vec<SubscriptionEntry>,
    /// Round-robin cursor per (pattern, group).
    cursors: HashMap<(String, String), usize>,
}

#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions.
    pub async fn subscription_count(&self) -> usize {
        let mut state = self.state.lock().await;
        state.subs.retain(|s| !s.tx.is_closed());
        state.subs.len()
    }

    async fn add_subscription(&self, pattern: &str, group: Option<&str>) -> TransportResult<MessageStream> {
        subjects::validate_pattern(pattern)?;

        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().await.subs.push(SubscriptionEntry {
            pattern: pattern.to_string(),
            group: group.map(str::to_string),
            tx,
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });
        Ok(Box::pin(stream))
    }

    /// Routes one message and returns how many subscriptions received it.
    pub async fn deliver(&self, msg: BrokerMessage) -> TransportResult<usize> {
        subjects::validate_subject(&msg.subject)?;

        let mut guard = self.state.lock().await;
        let state = &mut *guard;
        state.subs.retain(|s| !s.tx.is_closed());

        let mut delivered = 0;
        let mut groups: HashMap<(String, String), Vec<usize>> = HashMap::new();

        for (idx, sub) in state.subs.iter().enumerate() {
            if !subjects::matches(&sub.pattern, &msg.subject) {
                continue;
            }
            match &sub.group {
                None => {
                    if sub.tx.send(msg.clone()).is_ok() {
                        delivered += 1;
                    }
                }
                Some(group) => groups
                    .entry((sub.pattern.clone(), group.clone()))
                    .or_default()
                    .push(idx),
            }
        }

        for (key, members) in groups {
            let cursor = state.cursors.entry(key).or_insert(0);
            let pick = members[*cursor % members.len()];
            *cursor = cursor.wrapping_add(1);
            if state.subs[pick].tx.send(msg.clone()).is_ok() {
                delivered += 1;
            }
        }

        trace!(subject = %msg.subject, delivered, "in-memory delivery");
        Ok(delivered)
    }
}

#[async_trait]
impl BrokerTransport for InMemoryBroker {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> TransportResult<()> {
        self.deliver(BrokerMessage::new(subject, payload)).await?;
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> TransportResult<MessageStream> {
        self.add_subscription(pattern, None).await
    }

    async fn queue_subscribe(&self, pattern: &str, group: &str) -> TransportResult<MessageStream> {
        self.add_subscription(pattern, Some(group)).await
    }

    async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> TransportResult<Vec<u8>> {
        use futures::StreamExt;

        let inbox = format!("{INBOX_PREFIX}.{}", Uuid::new_v4().simple());
        let mut replies = self.add_subscription(&inbox, None).await?;

        let delivered = self
            .deliver(BrokerMessage::new(subject, payload).with_reply(inbox))
            .await?;
        if delivered == 0 {
            return Err(TransportError::NoResponders(subject.to_string()));
        }

        match tokio::time::timeout(timeout, replies.next()).await {
            Ok(Some(reply)) => Ok(reply.payload),
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout {
                subject: subject.to_string(),
                timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subjects::{EVENTS_EVENT, EVENTS_METRICS, EVENTS_WILDCARD, READER_QUERY, WRITER_QUEUE_GROUP};
    use futures::StreamExt;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fan_out_to_plain_subscribers() {
        let broker = InMemoryBroker::new();
        let mut a = broker.subscribe(EVENTS_WILDCARD).await.unwrap();
        let mut b = broker.subscribe(EVENTS_METRICS).await.unwrap();

        broker.publish(EVENTS_METRICS, b"{}".to_vec()).await.unwrap();

        assert_eq!(a.next().await.unwrap().subject, EVENTS_METRICS);
        assert_eq!(b.next().await.unwrap().subject, EVENTS_METRICS);
    }

    #[tokio::test]
    async fn test_queue_group_disjoint_delivery() {
        let broker = InMemoryBroker::new();
        let mut members = Vec::new();
        for _ in 0..3 {
            members.push(broker.queue_subscribe(EVENTS_WILDCARD, WRITER_QUEUE_GROUP).await.unwrap());
        }

        let total = 30;
        for i in 0..total {
            let delivered = broker
                .deliver(BrokerMessage::new(EVENTS_EVENT, format!("{i}")))
                .await
                .unwrap();
            assert_eq!(delivered, 1);
        }
        drop(broker);

        let mut seen = Vec::new();
        for mut m in members {
            let mut count = 0;
            while let Some(msg) = m.next().await {
                seen.push(msg.payload_text());
                count += 1;
            }
            assert!(count > 0);
        }
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), total);
    }

    #[tokio::test]
    async fn test_dropped_stream_unsubscribes() {
        let broker = InMemoryBroker::new();
        let s = broker.subscribe(EVENTS_WILDCARD).await.unwrap();
        assert_eq!(broker.subscription_count().await, 1);
        drop(s);
        assert_eq!(broker.subscription_count().await, 0);
        let delivered = broker.deliver(BrokerMessage::new(EVENTS_EVENT, "x")).await.unwrap();
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn test_request_reply_round_trip() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut requests = broker.subscribe(READER_QUERY).await.unwrap();

        let responder = broker.clone();
        tokio::spawn(async move {
            if let Some(msg) = requests.next().await {
                let reply = msg.reply.unwrap();
                responder.publish(&reply, b"pong".to_vec()).await.unwrap();
            }
        });

        let reply = broker
            .request(READER_QUERY, b"ping".to_vec(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, b"pong");
    }

    #[tokio::test]
    async fn test_request_times_out() {
        let broker = InMemoryBroker::new();
        let _silent = broker.subscribe(READER_QUERY).await.unwrap();

        let err = broker
            .request(READER_QUERY, b"ping".to_vec(), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_request_without_subscribers() {
        let broker = InMemoryBroker::new();
        let err = broker
            .request(READER_QUERY, b"ping".to_vec(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::NoResponders(_)));
    }

    #[tokio::test]
    async fn test_publish_rejects_wildcards() {
        let broker = InMemoryBroker::new();
        assert!(broker.publish(EVENTS_WILDCARD, vec![]).await.is_err());
    }
}
