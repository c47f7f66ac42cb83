use chrono::{DateTime, Utc};
use thiserror::Error;

use super::events::{DeviceMetric, Event, CRITICALITY_RANGE};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unparsable timestamp '{value}': {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
    #[error("criticality {0} outside 1..=10")]
    Criticality(u8),
}

/// Parses an RFC3339 timestamp with any fractional precision into UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, DecodeError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|source| DecodeError::Timestamp {
            value: value.to_string(),
            source,
        })
}

/// Decodes an `events.event` payload. The timestamp and criticality are
/// validated; the parsed time is returned alongside the message.
pub fn decode_event(payload: &[u8]) -> Result<(Event, DateTime<Utc>), DecodeError> {
    let event: Event = serde_json::from_slice(payload)?;
    if !CRITICALITY_RANGE.contains(&event.criticality) {
        return Err(DecodeError::Criticality(event.criticality));
    }
    let ts = parse_timestamp(&event.timestamp)?;
    Ok((event, ts))
}

/// Decodes an `events.metrics` payload.
pub fn decode_metric(payload: &[u8]) -> Result<(DeviceMetric, DateTime<Utc>), DecodeError> {
    let metric: DeviceMetric = serde_json::from_slice(payload)?;
    let ts = parse_timestamp(&metric.timestamp)?;
    Ok((metric, ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_nanosecond_timestamp() {
        let ts = parse_timestamp("2024-05-01T12:00:00.123456789+02:00").unwrap();
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.nanosecond(), 123_456_789);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(parse_timestamp("yesterday"), Err(DecodeError::Timestamp { .. })));
        assert!(parse_timestamp("2024-05-01 12:00:00").is_err());
    }

    #[test]
    fn test_decode_event_validates() {
        let ok = br#"{"id":"6f1c1d0e-5a7b-4c1e-9a57-0c5b5d1c2e3f","criticality":10,"timestamp":"2024-05-01T12:00:00Z","sourceDevice":"DiskUnit","eventType":"DriveFailure"}"#;
        assert!(decode_event(ok).is_ok());

        let bad_crit = br#"{"id":"6f1c1d0e-5a7b-4c1e-9a57-0c5b5d1c2e3f","criticality":0,"timestamp":"2024-05-01T12:00:00Z","sourceDevice":"DiskUnit","eventType":"DriveFailure"}"#;
        assert!(matches!(decode_event(bad_crit), Err(DecodeError::Criticality(0))));

        let bad_ts = br#"{"id":"6f1c1d0e-5a7b-4c1e-9a57-0c5b5d1c2e3f","criticality":5,"timestamp":"later","sourceDevice":"DiskUnit","eventType":"DriveFailure"}"#;
        assert!(matches!(decode_event(bad_ts), Err(DecodeError::Timestamp { .. })));
    }

    #[test]
    fn test_decode_metric_malformed() {
        assert!(matches!(decode_metric(b"{not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode_metric(br#"{"timestamp":"2024-05-01T12:00:00Z"}"#), Err(DecodeError::Json(_))));
    }
}
