use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::point::Point;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The store could not be reached (connect/reset/timeout).
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// The store answered and refused the write.
    #[error("write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    /// The point cannot be encoded for this store.
    #[error("invalid point: {0}")]
    InvalidPoint(String),
}

impl SinkError {
    /// Whether repeating the same write may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SinkError::Unavailable(_) => true,
            SinkError::Rejected { status, .. } => *status == 429 || *status >= 500,
            SinkError::InvalidPoint(_) => false,
        }
    }
}

pub type SinkResult<T> = Result<T, SinkError>;

/// Write contract of the persistence sink.
///
/// One writer is created at startup and shared by every concurrent
/// handler, so implementations must be safe for concurrent callers.
#[async_trait]
pub trait PointWriter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Durably stores one point. Errors are reported synchronously.
    async fn write_point(&self, point: &Point) -> SinkResult<()>;
}

#[async_trait]
impl<W: PointWriter + ?Sized> PointWriter for Arc<W> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn write_point(&self, point: &Point) -> SinkResult<()> {
        (**self).write_point(point).await
    }
}
