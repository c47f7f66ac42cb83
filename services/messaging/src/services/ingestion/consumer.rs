//! Queue-group consumer feeding the worker pool.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use abstractgateway::subjects::WRITER_QUEUE_GROUP;
use abstractgateway::BrokerTransport;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::handler::{IngestHandler, IngestStatsSnapshot};
use super::pool::WorkerPool;
use crate::traits::{MessagingService, ServiceError, ServiceResult, ServiceStatus};

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub queue_group: String,
    pub workers: usize,
    pub queue_capacity: usize,
    /// How long shutdown waits for queued and in-flight messages.
    pub shutdown_grace: Duration,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            queue_group: WRITER_QUEUE_GROUP.to_string(),
            workers: 16,
            queue_capacity: 1024,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

pub struct IngestionConsumer {
    name: String,
    broker: Arc<dyn BrokerTransport>,
    handler: Arc<IngestHandler>,
    cfg: IngestionConfig,
    running: AtomicBool,
    started_at: Mutex<Option<DateTime<Utc>>>,
}

impl IngestionConsumer {
    pub fn new(broker: Arc<dyn BrokerTransport>, handler: Arc<IngestHandler>, cfg: IngestionConfig) -> Self {
        Self {
            name: "ingestion".to_string(),
            broker,
            handler,
            cfg,
            running: AtomicBool::new(false),
            started_at: Mutex::new(None),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stats(&self) -> IngestStatsSnapshot {
        self.handler.stats()
    }

    async fn consume(&self, shutdown: CancellationToken) -> ServiceResult<()> {
        let router = self.handler.router();
        router.validate().map_err(|e| ServiceError::Config(e.to_string()))?;

        let mut deliveries = self
            .broker
            .queue_subscribe(router.subscription(), &self.cfg.queue_group)
            .await?;
        info!(
            service = %self.name,
            subject = router.subscription(),
            group = %self.cfg.queue_group,
            workers = self.cfg.workers,
            capacity = self.cfg.queue_capacity,
            "ingestion consumer subscribed"
        );

        let pool = WorkerPool::spawn(self.handler.clone(), self.cfg.workers, self.cfg.queue_capacity);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!(service = %self.name, "shutdown requested");
                    break;
                }
                next = deliveries.next() => {
                    let Some(msg) = next else {
                        warn!(service = %self.name, "subscription closed");
                        break;
                    };
                    self.handler.mark_received();
                    tokio::select! {
                        res = pool.dispatch(msg) => {
                            if let Err(msg) = res {
                                error!(service = %self.name, subject = %msg.subject, "worker pool stopped, message dropped");
                                break;
                            }
                        }
                        _ = shutdown.cancelled() => {
                            info!(service = %self.name, "shutdown requested while queue full");
                            break;
                        }
                    }
                }
            }
        }

        drop(deliveries);
        let report = pool.shutdown(self.cfg.shutdown_grace).await;
        let stats = self.stats();
        info!(
            service = %self.name,
            drained = report.drained,
            abandoned = report.abandoned,
            received = stats.received,
            handled = stats.handled,
            written = stats.written,
            decode_failures = stats.decode_failures,
            write_failures = stats.write_failures,
            unknown_subjects = stats.unknown_subjects,
            dead_lettered = stats.dead_lettered,
            "ingestion consumer stopped"
        );
        Ok(())
    }
}

#[async_trait]
impl MessagingService for IngestionConsumer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, shutdown: CancellationToken) -> ServiceResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }
        if let Ok(mut started) = self.started_at.lock() {
            *started = Some(Utc::now());
        }

        let res = self.consume(shutdown).await;
        self.running.store(false, Ordering::SeqCst);
        res
    }

    fn status(&self) -> ServiceStatus {
        let stats = self.stats();
        let mut status = ServiceStatus::new(&self.name);
        status.running = self.running.load(Ordering::SeqCst);
        status.started_at = self.started_at.lock().ok().and_then(|s| *s);
        status.processed_count = stats.written;
        status.error_count = stats.decode_failures + stats.write_failures;
        status
    }
}
