//! Messaging Service Traits
//!
//! Defines the contract shared by the long-running broker-facing services
//! (ingestion consumer, query responder, producer).

use abstractgateway::TransportError;
use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Service already running")]
    AlreadyRunning,
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service status information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ServiceStatus {
    pub name: String,
    pub running: bool,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub processed_count: u64,
    pub error_count: u64,
}

impl ServiceStatus {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            running: false,
            started_at: None,
            processed_count: 0,
            error_count: 0,
        }
    }
}

/// A service that runs against the broker until its shutdown token fires.
#[async_trait]
pub trait MessagingService: Send + Sync {
    /// Unique name of the service
    fn name(&self) -> &str;

    /// Run until `shutdown` is cancelled or the subscription ends.
    /// Startup failures (subscribe, invalid routing) are returned; per-message
    /// failures are logged and never end the loop.
    async fn run(&self, shutdown: CancellationToken) -> ServiceResult<()>;

    /// Get service status
    fn status(&self) -> ServiceStatus;
}
