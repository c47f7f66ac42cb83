//! Per-message ingestion: route, decode, build the point, write.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use abstractdatabase::{Point, PointWriter, SinkError};
use abstractgateway::models::parser::{decode_event, decode_metric};
use abstractgateway::{BrokerMessage, DecodeError, DeviceMetric, Event};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, warn};

use super::deadletter::{DeadLetter, DeadLetterRecord};
use super::router::{MessageKind, SubjectRouter};

pub const EVENTS_MEASUREMENT: &str = "events";
pub const METRICS_MEASUREMENT: &str = "device_metrics";

/// A payload decoded according to its subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Event(Event, DateTime<Utc>),
    Metric(DeviceMetric, DateTime<Utc>),
}

impl Decoded {
    pub fn decode(kind: MessageKind, payload: &[u8]) -> Option<Result<Self, DecodeError>> {
        match kind {
            MessageKind::Event => Some(decode_event(payload).map(|(e, ts)| Decoded::Event(e, ts))),
            MessageKind::DeviceMetric => Some(decode_metric(payload).map(|(m, ts)| Decoded::Metric(m, ts))),
            MessageKind::Unknown => None,
        }
    }

    pub fn source_device(&self) -> &str {
        match self {
            Decoded::Event(e, _) => &e.source_device,
            Decoded::Metric(m, _) => &m.source_device,
        }
    }

    /// Event type or metric type, for log context.
    pub fn type_name(&self) -> &str {
        match self {
            Decoded::Event(e, _) => &e.event_type,
            Decoded::Metric(m, _) => m.metric_type.as_str(),
        }
    }

    pub fn to_point(&self) -> Point {
        match self {
            Decoded::Event(e, ts) => Point::new(EVENTS_MEASUREMENT)
                .tag("event_id", e.id.to_string())
                .tag("criticality_level", e.criticality.to_string())
                .tag("source_device", e.source_device.as_str())
                .tag("event_type", e.event_type.as_str())
                .field("event_message", e.message().unwrap_or_default())
                .at(*ts),
            Decoded::Metric(m, ts) => Point::new(METRICS_MEASUREMENT)
                .tag("source_device", m.source_device.as_str())
                .tag("metric_type", m.metric_type.as_str())
                .field("value", m.value)
                .at(*ts),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Written,
    DecodeFailed,
    /// Write failed after retries. `dead_lettered` tells whether the
    /// message was republished on the dead-letter subject.
    WriteFailed { dead_lettered: bool },
    Unknown,
}

#[derive(Debug, Default)]
pub struct IngestStats {
    received: AtomicU64,
    handled: AtomicU64,
    written: AtomicU64,
    decode_failures: AtomicU64,
    write_failures: AtomicU64,
    unknown_subjects: AtomicU64,
    dead_lettered: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    /// Taken off the subscription, whether or not handling finished.
    pub received: u64,
    pub handled: u64,
    pub written: u64,
    pub decode_failures: u64,
    pub write_failures: u64,
    pub unknown_subjects: u64,
    pub dead_lettered: u64,
}

impl IngestStats {
    fn record(&self, outcome: IngestOutcome) {
        self.handled.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            IngestOutcome::Written => &self.written,
            IngestOutcome::DecodeFailed => &self.decode_failures,
            IngestOutcome::WriteFailed { dead_lettered } => {
                if dead_lettered {
                    self.dead_lettered.fetch_add(1, Ordering::Relaxed);
                }
                &self.write_failures
            }
            IngestOutcome::Unknown => &self.unknown_subjects,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            unknown_subjects: self.unknown_subjects.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}

/// Shared by every worker. Holds no per-message state.
pub struct IngestHandler {
    router: SubjectRouter,
    writer: Arc<dyn PointWriter>,
    dead_letter: Option<Arc<dyn DeadLetter>>,
    stats: IngestStats,
}

impl IngestHandler {
    pub fn new(router: SubjectRouter, writer: Arc<dyn PointWriter>) -> Self {
        Self {
            router,
            writer,
            dead_letter: None,
            stats: IngestStats::default(),
        }
    }

    pub fn with_dead_letter(mut self, dead_letter: Arc<dyn DeadLetter>) -> Self {
        self.dead_letter = Some(dead_letter);
        self
    }

    pub fn router(&self) -> &SubjectRouter {
        &self.router
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.stats.snapshot()
    }

    /// Counts a delivery before it is queued for a worker.
    pub fn mark_received(&self) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);
    }

    pub async fn handle(&self, msg: &BrokerMessage) -> IngestOutcome {
        let outcome = self.process(msg).await;
        self.stats.record(outcome);
        outcome
    }

    async fn process(&self, msg: &BrokerMessage) -> IngestOutcome {
        let kind = self.router.resolve(&msg.subject);
        let decoded = match Decoded::decode(kind, &msg.payload) {
            None => {
                warn!(subject = %msg.subject, "no route for subject, dropping message");
                return IngestOutcome::Unknown;
            }
            Some(Err(e)) => {
                error!(subject = %msg.subject, error = %e, payload = %msg.payload_text(), "failed to decode message");
                return IngestOutcome::DecodeFailed;
            }
            Some(Ok(d)) => d,
        };

        let point = decoded.to_point();
        match self.writer.write_point(&point).await {
            Ok(()) => {
                debug!(
                    subject = %msg.subject,
                    device = decoded.source_device(),
                    kind = decoded.type_name(),
                    sink = self.writer.name(),
                    "point written"
                );
                IngestOutcome::Written
            }
            Err(e) => {
                error!(
                    subject = %msg.subject,
                    device = decoded.source_device(),
                    kind = decoded.type_name(),
                    error = %e,
                    "failed to write point"
                );
                let dead_lettered = self.send_dead_letter(msg, &e).await;
                IngestOutcome::WriteFailed { dead_lettered }
            }
        }
    }

    async fn send_dead_letter(&self, msg: &BrokerMessage, err: &SinkError) -> bool {
        let Some(dl) = &self.dead_letter else {
            return false;
        };
        match dl.send(DeadLetterRecord::new(msg, err)).await {
            Ok(()) => true,
            Err(e) => {
                error!(subject = %msg.subject, error = %e, "failed to publish dead letter");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use abstractdatabase::{FieldValue, MemoryWriter};
    use abstractgateway::{BrokerTransport, InMemoryBroker};
    use futures::StreamExt;

    use crate::services::ingestion::deadletter::BrokerDeadLetter;

    const EVENT: &str = r#"{"id":"9b2f3c1e-3a5b-4c7d-8e9f-0a1b2c3d4e5f","criticality":9,"timestamp":"2024-05-01T12:00:00.5Z","sourceDevice":"DiskUnit","eventType":"DriveFailure","eventMessage":"sector errors"}"#;
    const METRIC: &str = r#"{"timestamp":"2024-05-01T12:00:00Z","sourceDevice":"StorageArray","metricType":"IOPs","value":512.5}"#;

    fn handler(writer: Arc<MemoryWriter>) -> IngestHandler {
        IngestHandler::new(SubjectRouter::standard(), writer)
    }

    #[tokio::test]
    async fn test_event_point_shape() {
        let writer = Arc::new(MemoryWriter::new());
        let h = handler(writer.clone());

        let out = h.handle(&BrokerMessage::new("events.event", EVENT)).await;
        assert_eq!(out, IngestOutcome::Written);

        let points = writer.points().await;
        let p = &points[0];
        assert_eq!(p.measurement, EVENTS_MEASUREMENT);
        assert_eq!(p.tag_value("event_id"), Some("9b2f3c1e-3a5b-4c7d-8e9f-0a1b2c3d4e5f"));
        assert_eq!(p.tag_value("criticality_level"), Some("9"));
        assert_eq!(p.tag_value("source_device"), Some("DiskUnit"));
        assert_eq!(p.tag_value("event_type"), Some("DriveFailure"));
        assert_eq!(p.fields.get("event_message"), Some(&FieldValue::from("sector errors")));
        assert_eq!(p.timestamp.timestamp_subsec_millis(), 500);
    }

    #[tokio::test]
    async fn test_missing_event_message_is_empty_field() {
        let writer = Arc::new(MemoryWriter::new());
        let h = handler(writer.clone());
        let payload = r#"{"id":"9b2f3c1e-3a5b-4c7d-8e9f-0a1b2c3d4e5f","criticality":1,"timestamp":"2024-05-01T12:00:00Z","sourceDevice":"d","eventType":"t"}"#;

        h.handle(&BrokerMessage::new("events.event", payload)).await;
        let points = writer.points().await;
        assert_eq!(points[0].fields.get("event_message"), Some(&FieldValue::from("")));
    }

    #[tokio::test]
    async fn test_null_event_message_is_empty_field() {
        let writer = Arc::new(MemoryWriter::new());
        let h = handler(writer.clone());
        let payload = EVENT.replace(r#""sector errors""#, "null");

        assert_eq!(h.handle(&BrokerMessage::new("events.event", payload)).await, IngestOutcome::Written);
        assert_eq!(writer.points().await[0].fields.get("event_message"), Some(&FieldValue::from("")));
    }

    #[tokio::test]
    async fn test_metric_point_shape() {
        let writer = Arc::new(MemoryWriter::new());
        let h = handler(writer.clone());

        h.handle(&BrokerMessage::new("events.metrics", METRIC)).await;
        let points = writer.points().await;
        assert_eq!(points[0].measurement, METRICS_MEASUREMENT);
        assert_eq!(points[0].tag_value("metric_type"), Some("IOPs"));
        assert_eq!(points[0].fields.get("value"), Some(&FieldValue::Float(512.5)));
    }

    #[tokio::test]
    async fn test_decode_failure_then_next_message_written() {
        let writer = Arc::new(MemoryWriter::new());
        let h = handler(writer.clone());

        assert_eq!(h.handle(&BrokerMessage::new("events.metrics", "{not json")).await, IngestOutcome::DecodeFailed);
        let bad_crit = EVENT.replace(r#""criticality":9"#, r#""criticality":11"#);
        assert_eq!(h.handle(&BrokerMessage::new("events.event", bad_crit)).await, IngestOutcome::DecodeFailed);
        assert_eq!(h.handle(&BrokerMessage::new("events.metrics", METRIC)).await, IngestOutcome::Written);

        assert_eq!(writer.points().await.len(), 1);
        let stats = h.stats();
        assert_eq!(stats.handled, 3);
        assert_eq!(stats.received, 0);
        assert_eq!(stats.decode_failures, 2);
        assert_eq!(stats.written, 1);
    }

    #[tokio::test]
    async fn test_unknown_subject_dropped() {
        let writer = Arc::new(MemoryWriter::new());
        let h = handler(writer.clone());

        assert_eq!(h.handle(&BrokerMessage::new("events.security", METRIC)).await, IngestOutcome::Unknown);
        assert_eq!(writer.attempts().await, 0);
        assert_eq!(h.stats().unknown_subjects, 1);
    }

    #[tokio::test]
    async fn test_write_failure_dead_lettered() {
        let broker = Arc::new(InMemoryBroker::new());
        let mut dl_sub = broker.subscribe("deadletter.>").await.unwrap();

        let writer = Arc::new(MemoryWriter::new());
        writer.fail_always(Some(SinkError::InvalidPoint("bad".into()))).await;
        let h = handler(writer).with_dead_letter(Arc::new(BrokerDeadLetter::new(broker.clone())));

        let out = h.handle(&BrokerMessage::new("events.metrics", METRIC)).await;
        assert_eq!(out, IngestOutcome::WriteFailed { dead_lettered: true });
        assert_eq!(dl_sub.next().await.unwrap().subject, "deadletter.events.metrics");

        let stats = h.stats();
        assert_eq!(stats.write_failures, 1);
        assert_eq!(stats.dead_lettered, 1);
    }

    #[tokio::test]
    async fn test_write_failure_without_dead_letter() {
        let writer = Arc::new(MemoryWriter::new());
        writer.fail_next([SinkError::Unavailable("down".into())]).await;
        let h = handler(writer);

        let out = h.handle(&BrokerMessage::new("events.metrics", METRIC)).await;
        assert_eq!(out, IngestOutcome::WriteFailed { dead_lettered: false });
    }
}
