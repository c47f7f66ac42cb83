//! Telemetry gateway core library.
//!
//! Broker-agnostic pieces of the messaging core: the transport trait,
//! the subject taxonomy, the JSON wire models and an in-process broker.
pub mod memory;
pub mod models;
pub mod subjects;
pub mod transport;

pub use memory::InMemoryBroker;
pub use models::events::{DeviceMetric, Event, EventId, MetricType};
pub use models::parser::DecodeError;
pub use models::query::{ReaderRequest, ReaderResponse, ResponseStatus};
pub use subjects::SubjectError;
pub use transport::{BrokerMessage, BrokerTransport, MessageStream, TransportError, TransportResult};
