//! Messaging services built on the broker transport and the point sink.
//!
//! - [`services::ingestion`]: queue-group consumer writing telemetry to the sink
//! - [`services::query_client`]: sequential request/reply client with a log sink
//! - [`services::query_responder`]: reply side of the query protocol
//! - [`services::producer`]: simulated telemetry source
pub mod observability;
pub mod services;
pub mod traits;

pub use services::ingestion::{
    BrokerDeadLetter, IngestHandler, IngestOutcome, IngestionConfig, IngestionConsumer, MessageKind, SubjectRouter,
};
pub use services::logsink::LogSink;
pub use services::producer::{ProducerConfig, TelemetryProducer};
pub use services::query_client::{QueryClient, QueryClientConfig, QueryOutcome, QueryRunSummary};
pub use services::query_responder::{QueryHandler, QueryResponder};
pub use traits::{MessagingService, ServiceError, ServiceResult, ServiceStatus};
