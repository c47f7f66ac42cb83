//! In-memory point writer.
//!
//! Records every accepted point. Failures can be scripted per call or
//! forced permanently, which is what the ingestion tests rely on.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::writer::{PointWriter, SinkError, SinkResult};
use crate::model::point::Point;

#[derive(Default)]
struct MemoryState {
    points: Vec<Point>,
    scripted: VecDeque<SinkError>,
    always_fail: Option<SinkError>,
    attempts: usize,
}

#[derive(Default)]
pub struct MemoryWriter {
    state: Mutex<MemoryState>,
    delay: Option<Duration>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write sleeps for `delay` before completing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The next calls fail with these errors, in order, before writes succeed again.
    pub async fn fail_next(&self, errors: impl IntoIterator<Item = SinkError>) {
        self.state.lock().await.scripted.extend(errors);
    }

    /// Every call fails with `error` until cleared with `None`.
    pub async fn fail_always(&self, error: Option<SinkError>) {
        self.state.lock().await.always_fail = error;
    }

    pub async fn points(&self) -> Vec<Point> {
        self.state.lock().await.points.clone()
    }

    /// Total write calls, successful or not.
    pub async fn attempts(&self) -> usize {
        self.state.lock().await.attempts
    }
}

#[async_trait]
impl PointWriter for MemoryWriter {
    fn name(&self) -> &str {
        "memory"
    }

    async fn write_point(&self, point: &Point) -> SinkResult<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.attempts += 1;

        if let Some(err) = state.scripted.pop_front() {
            return Err(err);
        }
        if let Some(err) = &state.always_fail {
            return Err(err.clone());
        }
        if point.fields.is_empty() {
            return Err(SinkError::InvalidPoint(format!("'{}' has no fields", point.measurement)));
        }

        state.points.push(point.clone());
        Ok(())
    }
}
