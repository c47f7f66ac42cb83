//! Database-agnostic time-series point.
//!
//! A point is a measurement name, a tag set (indexed strings), a field set
//! (the recorded values) and a timestamp. Tags and fields are kept in
//! ordered maps so any encoding of a point is deterministic.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
    String(String),
    Bool(bool),
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub fields: BTreeMap<String, FieldValue>,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    /// New point stamped with the current time; use [`Point::at`] to override.
    pub fn new(measurement: impl Into<String>) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_builder() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let p = Point::new("device_metrics")
            .tag("source_device", "DiskUnit")
            .tag("metric_type", "DiskTemp")
            .field("value", 41.5)
            .at(ts);

        assert_eq!(p.measurement, "device_metrics");
        assert_eq!(p.tag_value("source_device"), Some("DiskUnit"));
        assert_eq!(p.fields.get("value"), Some(&FieldValue::Float(41.5)));
        assert_eq!(p.timestamp, ts);
    }

    #[test]
    fn test_tag_overwrite() {
        let p = Point::new("events").tag("k", "a").tag("k", "b");
        assert_eq!(p.tags.len(), 1);
        assert_eq!(p.tag_value("k"), Some("b"));
    }
}
