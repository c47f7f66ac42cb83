use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

/// Lowest and highest accepted event criticality.
pub const CRITICALITY_RANGE: std::ops::RangeInclusive<u8> = 1..=10;

/// A discrete occurrence reported by a device. Published on `events.event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub criticality: u8,
    /// RFC3339 timestamp, kept verbatim so re-encoding preserves it.
    pub timestamp: String,
    pub source_device: String,
    pub event_type: String,
    /// `None` when the key is absent, `Some(None)` for an explicit `null`.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub event_message: Option<Option<String>>,
}

impl Event {
    pub fn message(&self) -> Option<&str> {
        self.event_message.as_ref()?.as_deref()
    }
}

fn present<'de, D>(d: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(d).map(Some)
}

/// Event id. Must parse as a UUID; the original text is kept so uppercase or
/// braced ids re-encode unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventId(String);

impl EventId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for EventId {
    type Error = uuid::Error;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Uuid::parse_str(&raw)?;
        Ok(Self(raw))
    }
}

impl From<EventId> for String {
    fn from(id: EventId) -> Self {
        id.0
    }
}

impl From<Uuid> for EventId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One sampled measurement. Published on `events.metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMetric {
    pub timestamp: String,
    pub source_device: String,
    pub metric_type: MetricType,
    pub value: f64,
}

/// Metric kinds emitted by the producer. Anything else is carried as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricType {
    DiskTemp,
    #[serde(rename = "IOPs")]
    Iops,
    Latency,
    CapacityUsed,
    #[serde(untagged)]
    Other(String),
}

impl MetricType {
    pub fn as_str(&self) -> &str {
        match self {
            MetricType::DiskTemp => "DiskTemp",
            MetricType::Iops => "IOPs",
            MetricType::Latency => "Latency",
            MetricType::CapacityUsed => "CapacityUsed",
            MetricType::Other(s) => s,
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Formats `ts` the way producers stamp messages (UTC, nanosecond precision).
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}
