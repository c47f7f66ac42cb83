pub mod consumer;
pub mod deadletter;
pub mod handler;
pub mod pool;
pub mod router;

pub use consumer::{IngestionConfig, IngestionConsumer};
pub use deadletter::{BrokerDeadLetter, DeadLetter, DeadLetterRecord};
pub use handler::{Decoded, IngestHandler, IngestOutcome, IngestStatsSnapshot};
pub use pool::{ShutdownReport, WorkerPool};
pub use router::{MessageKind, RouterError, SubjectRouter};
