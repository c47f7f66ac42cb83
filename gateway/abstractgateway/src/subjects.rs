//! Subject taxonomy and wildcard matching.
//!
//! Subjects are dot-delimited routing keys. Patterns may contain `*`
//! (exactly one token) and a trailing `>` (one or more tokens).

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Individual [`Event`](crate::models::events::Event) messages.
pub const EVENTS_EVENT: &str = "events.event";

/// Individual [`DeviceMetric`](crate::models::events::DeviceMetric) messages.
pub const EVENTS_METRICS: &str = "events.metrics";

/// Wildcard covering every ingestion subject.
pub const EVENTS_WILDCARD: &str = "events.*";

/// Request subject for all reader queries.
pub const READER_QUERY: &str = "reader.query";

/// Default queue group shared by ingestion consumers.
pub const WRITER_QUEUE_GROUP: &str = "writer_queue_group";

/// Prefix for dead-lettered ingestion messages.
pub const DEAD_LETTER_PREFIX: &str = "deadletter";

/// Prefix for implicit reply subjects.
pub const INBOX_PREFIX: &str = "_INBOX";

static SUBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+(\.[A-Za-z0-9_\-]+)*$").expect("valid subject regex"));

static PATTERN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_\-]+|\*)(\.([A-Za-z0-9_\-]+|\*))*(\.>)?$|^>$").expect("valid pattern regex")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubjectError {
    #[error("invalid subject '{0}'")]
    InvalidSubject(String),
    #[error("invalid subject pattern '{0}'")]
    InvalidPattern(String),
}

/// Validates a concrete (publishable) subject. Wildcards are rejected.
pub fn validate_subject(subject: &str) -> Result<(), SubjectError> {
    if SUBJECT_RE.is_match(subject) {
        Ok(())
    } else {
        Err(SubjectError::InvalidSubject(subject.to_string()))
    }
}

/// Validates a subscription pattern.
pub fn validate_pattern(pattern: &str) -> Result<(), SubjectError> {
    if PATTERN_RE.is_match(pattern) {
        Ok(())
    } else {
        Err(SubjectError::InvalidPattern(pattern.to_string()))
    }
}

/// Returns true when `subject` is routed to a subscription on `pattern`.
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut subject_tokens = subject.split('.');

    for token in pattern.split('.') {
        match token {
            ">" => return subject_tokens.next().is_some(),
            "*" => {
                if subject_tokens.next().is_none() {
                    return false;
                }
            }
            literal => match subject_tokens.next() {
                Some(s) if s == literal => {}
                _ => return false,
            },
        }
    }

    subject_tokens.next().is_none()
}

/// Returns true when every subject matched by `inner` is also matched by `outer`.
///
/// Used at startup to check that registered routes are reachable through
/// the subscription wildcard.
pub fn pattern_covers(outer: &str, inner: &str) -> bool {
    let outer_tokens: Vec<&str> = outer.split('.').collect();
    let inner_tokens: Vec<&str> = inner.split('.').collect();

    for (i, o) in outer_tokens.iter().enumerate() {
        if *o == ">" {
            return inner_tokens.len() > i;
        }
        let Some(t) = inner_tokens.get(i) else {
            return false;
        };
        match (*o, *t) {
            ("*", ">") => return false,
            ("*", _) => {}
            (o, t) if o == t => {}
            _ => return false,
        }
    }

    outer_tokens.len() == inner_tokens.len()
}

/// Dead-letter subject for a message originally published on `subject`.
pub fn dead_letter_subject(subject: &str) -> String {
    format!("{DEAD_LETTER_PREFIX}.{subject}")
}
