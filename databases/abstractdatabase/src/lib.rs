//! Persistence sink abstraction.
//!
//! - [`model::point`]: the tagged, timestamped point handed to a sink
//! - [`client::writer`]: the `PointWriter` contract and its error type
//! - [`client::memory`]: an in-memory writer for tests and dry runs
//! - [`controller::retry`]: bounded exponential-backoff retry wrapper
pub mod client {
    pub mod memory;
    pub mod writer;
}
pub mod controller {
    pub mod retry;
}
pub mod model {
    pub mod point;
}

pub use client::memory::MemoryWriter;
pub use client::writer::{PointWriter, SinkError, SinkResult};
pub use controller::retry::{RetryPolicy, RetryingWriter};
pub use model::point::{FieldValue, Point};
