//! InfluxDB line protocol encoding.
//!
//! `measurement,tag=v field=1.5,other="text" 1714564800000000000`

use std::fmt::Write;

use abstractdatabase::{FieldValue, Point, SinkError};

/// Line breaks would end the point early, so they are written as `\n` / `\r`.
fn escape(s: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c if special.contains(&c) => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_measurement(s: &str) -> String {
    escape(s, &[',', ' '])
}

/// Tag keys, tag values and field keys share the same escaping rules.
fn escape_key(s: &str) -> String {
    escape(s, &[',', '=', ' '])
}

fn escape_string_field(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if matches!(c, '"' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn encode_field(value: &FieldValue) -> Result<String, SinkError> {
    Ok(match value {
        FieldValue::Float(v) if !v.is_finite() => {
            return Err(SinkError::InvalidPoint(format!("non-finite float {v}")));
        }
        FieldValue::Float(v) => {
            // Keep a decimal point so the column stays float-typed.
            if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{v:.1}")
            } else {
                format!("{v}")
            }
        }
        FieldValue::Integer(v) => format!("{v}i"),
        FieldValue::String(s) => escape_string_field(s),
        FieldValue::Bool(b) => b.to_string(),
    })
}

/// Encodes one point as a single line (no trailing newline).
pub fn encode_point(point: &Point) -> Result<String, SinkError> {
    if point.measurement.is_empty() {
        return Err(SinkError::InvalidPoint("empty measurement".into()));
    }
    if point.fields.is_empty() {
        return Err(SinkError::InvalidPoint(format!("'{}' has no fields", point.measurement)));
    }
    let ts = point
        .timestamp
        .timestamp_nanos_opt()
        .ok_or_else(|| SinkError::InvalidPoint(format!("timestamp {} out of range", point.timestamp)))?;

    let mut line = escape_measurement(&point.measurement);

    for (k, v) in &point.tags {
        // Influx drops empty tag values; skipping keeps the line valid.
        if v.is_empty() {
            continue;
        }
        let _ = write!(line, ",{}={}", escape_key(k), escape_key(v));
    }

    let mut first = true;
    for (k, v) in &point.fields {
        line.push(if first { ' ' } else { ',' });
        first = false;
        let _ = write!(line, "{}={}", escape_key(k), encode_field(v)?);
    }

    let _ = write!(line, " {ts}");
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_metric_line() {
        let p = Point::new("device_metrics")
            .tag("source_device", "DiskUnit")
            .tag("metric_type", "DiskTemp")
            .field("value", 41.25)
            .at(ts());

        assert_eq!(
            encode_point(&p).unwrap(),
            "device_metrics,metric_type=DiskTemp,source_device=DiskUnit value=41.25 1714564800000000000"
        );
    }

    #[test]
    fn test_whole_float_keeps_decimal() {
        let p = Point::new("m").field("value", 42.0).at(ts());
        assert!(encode_point(&p).unwrap().contains("value=42.0 "));
    }

    #[test]
    fn test_escaping() {
        let p = Point::new("my events")
            .tag("event type", "Drive,Failure=x")
            .field("event_message", r#"said "hi" \o/"#)
            .at(ts());

        assert_eq!(
            encode_point(&p).unwrap(),
            r#"my\ events,event\ type=Drive\,Failure\=x event_message="said \"hi\" \\o/" 1714564800000000000"#
        );
    }

    #[test]
    fn test_line_breaks_stay_on_one_line() {
        let p = Point::new("device\nmetrics")
            .tag("metric_type", "DiskTemp")
            .tag("source_device", "disk\nevil value=999\r")
            .field("value", 1.5)
            .at(ts());

        let line = encode_point(&p).unwrap();
        assert_eq!(line.lines().count(), 1);
        assert_eq!(
            line,
            r"device\nmetrics,metric_type=DiskTemp,source_device=disk\nevil\ value\=999\r value=1.5 1714564800000000000"
        );
    }

    #[test]
    fn test_field_types() {
        let p = Point::new("m")
            .field("a", 7i64)
            .field("b", true)
            .field("c", "")
            .at(ts());
        assert_eq!(encode_point(&p).unwrap(), r#"m a=7i,b=true,c="" 1714564800000000000"#);
    }

    #[test]
    fn test_empty_tag_value_skipped() {
        let p = Point::new("m").tag("empty", "").field("v", 1.5).at(ts());
        assert_eq!(encode_point(&p).unwrap(), "m v=1.5 1714564800000000000");
    }

    #[test]
    fn test_invalid_points() {
        assert!(encode_point(&Point::new("m").at(ts())).is_err());
        assert!(encode_point(&Point::new("m").field("v", f64::NAN).at(ts())).is_err());
    }
}
