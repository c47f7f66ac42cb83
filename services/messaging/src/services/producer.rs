//! Simulated telemetry producer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use abstractgateway::models::events::format_timestamp;
use abstractgateway::subjects::{EVENTS_EVENT, EVENTS_METRICS};
use abstractgateway::{BrokerTransport, DeviceMetric, Event, MetricType};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::traits::{MessagingService, ServiceError, ServiceResult, ServiceStatus};

pub const DEFAULT_DEVICES: [&str; 3] = ["StorageArray", "DiskUnit", "CloudStorage"];
pub const EVENT_TYPES: [&str; 3] = ["DriveFailure", "DataCorruption", "UnauthorizedAccess"];
const METRIC_TYPES: [MetricType; 4] = [
    MetricType::DiskTemp,
    MetricType::Iops,
    MetricType::Latency,
    MetricType::CapacityUsed,
];

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub interval: Duration,
    /// Chance per tick that one event is published.
    pub event_probability: f64,
    pub devices: Vec<String>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            event_probability: 0.25,
            devices: DEFAULT_DEVICES.iter().map(|d| d.to_string()).collect(),
        }
    }
}

impl ProducerConfig {
    /// Interval from `GENERATION_INTERVAL_SECONDS`; anything unparsable or
    /// non-positive falls back to one second.
    pub fn interval_from_env(raw: Option<&str>) -> Duration {
        raw.and_then(|s| s.trim().parse::<i64>().ok())
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(Duration::from_secs(1))
    }
}

/// Value range a metric type is sampled from.
pub fn metric_range(metric: &MetricType) -> (f64, f64) {
    match metric {
        MetricType::DiskTemp => (25.0, 60.0),
        MetricType::Iops => (100.0, 1000.0),
        MetricType::Latency => (0.5, 10.5),
        MetricType::CapacityUsed => (10.0, 95.0),
        MetricType::Other(_) => (0.0, 100.0),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub metrics: usize,
    pub events: usize,
    pub failures: usize,
}

pub struct TelemetryProducer {
    broker: Arc<dyn BrokerTransport>,
    cfg: ProducerConfig,
    rng: Mutex<StdRng>,
    running: AtomicBool,
    published: AtomicU64,
    failures: AtomicU64,
}

impl TelemetryProducer {
    pub fn new(broker: Arc<dyn BrokerTransport>, cfg: ProducerConfig) -> Self {
        Self::with_rng(broker, cfg, StdRng::from_entropy())
    }

    /// Deterministic producer for tests.
    pub fn seeded(broker: Arc<dyn BrokerTransport>, cfg: ProducerConfig, seed: u64) -> Self {
        Self::with_rng(broker, cfg, StdRng::seed_from_u64(seed))
    }

    fn with_rng(broker: Arc<dyn BrokerTransport>, cfg: ProducerConfig, rng: StdRng) -> Self {
        Self {
            broker,
            cfg,
            rng: Mutex::new(rng),
            running: AtomicBool::new(false),
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    pub fn generate_metric(rng: &mut impl Rng, device: &str) -> DeviceMetric {
        let metric_type = METRIC_TYPES.choose(rng).cloned().unwrap_or(MetricType::DiskTemp);
        let (lo, hi) = metric_range(&metric_type);
        DeviceMetric {
            timestamp: format_timestamp(Utc::now()),
            source_device: device.to_string(),
            metric_type,
            value: rng.gen_range(lo..=hi),
        }
    }

    pub fn generate_event(rng: &mut impl Rng, devices: &[String]) -> Event {
        let device = devices.choose(rng).map(String::as_str).unwrap_or(DEFAULT_DEVICES[0]);
        let event_type = EVENT_TYPES.choose(rng).copied().unwrap_or(EVENT_TYPES[0]);
        let criticality = rng.gen_range(1..=10);
        Event {
            id: Uuid::new_v4().into(),
            criticality,
            timestamp: format_timestamp(Utc::now()),
            source_device: device.to_string(),
            event_type: event_type.to_string(),
            event_message: Some(Some(format!("{event_type} reported by {device} (criticality {criticality})"))),
        }
    }

    fn sample(&self) -> Option<(Vec<DeviceMetric>, Option<Event>)> {
        let mut rng = self.rng.lock().ok()?;
        let metrics = self
            .cfg
            .devices
            .iter()
            .map(|d| Self::generate_metric(&mut *rng, d))
            .collect();
        let event = rng
            .gen_bool(self.cfg.event_probability.clamp(0.0, 1.0))
            .then(|| Self::generate_event(&mut *rng, &self.cfg.devices));
        Some((metrics, event))
    }

    /// One generation cycle: a metric per device, maybe one event.
    pub async fn tick(&self) -> TickReport {
        let Some((metrics, event)) = self.sample() else {
            error!("producer rng poisoned, skipping tick");
            return TickReport::default();
        };

        let mut report = TickReport::default();
        for metric in &metrics {
            if self.publish(EVENTS_METRICS, metric).await {
                debug!(device = %metric.source_device, metric = %metric.metric_type, "published metric");
                report.metrics += 1;
            } else {
                report.failures += 1;
            }
        }
        if let Some(event) = &event {
            if self.publish(EVENTS_EVENT, event).await {
                debug!(
                    device = %event.source_device,
                    event = %event.event_type,
                    criticality = event.criticality,
                    "published event"
                );
                report.events += 1;
            } else {
                report.failures += 1;
            }
        }
        report
    }

    async fn publish<T: Serialize>(&self, subject: &str, msg: &T) -> bool {
        let body = match serde_json::to_vec(msg) {
            Ok(b) => b,
            Err(e) => {
                error!(subject, error = %e, "failed to serialize message");
                self.failures.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        };
        match self.broker.publish(subject, body).await {
            Ok(()) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(e) => {
                error!(subject, error = %e, "failed to publish message");
                self.failures.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

#[async_trait]
impl MessagingService for TelemetryProducer {
    fn name(&self) -> &str {
        "producer"
    }

    async fn run(&self, shutdown: CancellationToken) -> ServiceResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServiceError::AlreadyRunning);
        }
        info!(
            events = EVENTS_EVENT,
            metrics = EVENTS_METRICS,
            interval = ?self.cfg.interval,
            devices = self.cfg.devices.len(),
            "producer started"
        );

        // first tick one interval after start
        let start = tokio::time::Instant::now() + self.cfg.interval;
        let mut ticker = tokio::time::interval_at(start, self.cfg.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(published = self.published.load(Ordering::Relaxed), "producer stopped");
        Ok(())
    }

    fn status(&self) -> ServiceStatus {
        let mut status = ServiceStatus::new(self.name());
        status.running = self.running.load(Ordering::SeqCst);
        status.processed_count = self.published.load(Ordering::Relaxed);
        status.error_count = self.failures.load(Ordering::Relaxed);
        status
    }
}
