//! Bounded exponential-backoff retry around a [`PointWriter`].
//!
//! Only transient failures are retried. Once the attempt budget is spent
//! the last error is returned and the caller decides what happens to the
//! point (log, dead-letter, drop).

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::client::writer::{PointWriter, SinkResult};
use crate::model::point::Point;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retrying.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sleep before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let secs = self.initial_backoff.as_secs_f64() * exp;
        Duration::from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
    }
}

pub struct RetryingWriter<W> {
    inner: W,
    policy: RetryPolicy,
}

impl<W: PointWriter> RetryingWriter<W> {
    pub fn new(inner: W, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<W: PointWriter> PointWriter for RetryingWriter<W> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn write_point(&self, point: &Point) -> SinkResult<()> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.inner.write_point(point).await {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        sink = self.inner.name(),
                        measurement = %point.measurement,
                        attempt,
                        ?wait,
                        "transient write failure, retrying: {e}"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::memory::MemoryWriter;
    use crate::client::writer::SinkError;
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(400));
        assert_eq!(p.backoff(10), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let mem = Arc::new(MemoryWriter::new());
        mem.fail_next([
            SinkError::Unavailable("reset".into()),
            SinkError::Rejected { status: 503, body: String::new() },
        ])
        .await;

        let writer = RetryingWriter::new(mem.clone(), fast_policy(3));
        writer
            .write_point(&Point::new("events").field("event_message", "x"))
            .await
            .unwrap();

        assert_eq!(mem.attempts().await, 3);
        assert_eq!(mem.points().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let mem = Arc::new(MemoryWriter::new());
        mem.fail_always(Some(SinkError::Unavailable("down".into()))).await;

        let writer = RetryingWriter::new(mem.clone(), fast_policy(4));
        let err = writer
            .write_point(&Point::new("events").field("event_message", "x"))
            .await
            .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(mem.attempts().await, 4);
    }

    #[tokio::test]
    async fn test_permanent_failure_not_retried() {
        let mem = Arc::new(MemoryWriter::new());
        mem.fail_always(Some(SinkError::Rejected { status: 400, body: "bad".into() })).await;

        let writer = RetryingWriter::new(mem.clone(), fast_policy(5));
        assert!(writer
            .write_point(&Point::new("events").field("event_message", "x"))
            .await
            .is_err());
        assert_eq!(mem.attempts().await, 1);
    }
}
