//! Subject → message-kind routing.
//!
//! The concrete subject of a delivery, never its payload, decides how it
//! is decoded. Routes are registered up front and validated before the
//! consumer subscribes; anything that matches no route resolves to
//! [`MessageKind::Unknown`].

use abstractgateway::subjects::{self, SubjectError, EVENTS_EVENT, EVENTS_METRICS, EVENTS_WILDCARD};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Event,
    DeviceMetric,
    /// Fallback for subjects without a registered route. Logged and dropped.
    Unknown,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RouterError {
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error("route '{0}' registered twice")]
    Duplicate(String),
    #[error("route '{pattern}' is not reachable through subscription '{subscription}'")]
    Unreachable { pattern: String, subscription: String },
    #[error("no routes registered")]
    Empty,
}

#[derive(Debug, Clone)]
pub struct SubjectRouter {
    subscription: String,
    routes: Vec<(String, MessageKind)>,
}

impl SubjectRouter {
    /// Empty router for deliveries arriving on `subscription`.
    pub fn new(subscription: impl Into<String>) -> Self {
        Self {
            subscription: subscription.into(),
            routes: Vec::new(),
        }
    }

    /// `events.*` with `events.event` and `events.metrics` registered.
    pub fn standard() -> Self {
        Self::new(EVENTS_WILDCARD)
            .route(EVENTS_EVENT, MessageKind::Event)
            .route(EVENTS_METRICS, MessageKind::DeviceMetric)
    }

    pub fn route(mut self, pattern: impl Into<String>, kind: MessageKind) -> Self {
        self.routes.push((pattern.into(), kind));
        self
    }

    pub fn subscription(&self) -> &str {
        &self.subscription
    }

    /// Startup check: every pattern is well formed, unique and reachable.
    pub fn validate(&self) -> Result<(), RouterError> {
        subjects::validate_pattern(&self.subscription)?;
        if self.routes.is_empty() {
            return Err(RouterError::Empty);
        }

        for (i, (pattern, _)) in self.routes.iter().enumerate() {
            subjects::validate_pattern(pattern)?;
            if self.routes[..i].iter().any(|(p, _)| p == pattern) {
                return Err(RouterError::Duplicate(pattern.clone()));
            }
            if !subjects::pattern_covers(&self.subscription, pattern) {
                return Err(RouterError::Unreachable {
                    pattern: pattern.clone(),
                    subscription: self.subscription.clone(),
                });
            }
        }
        Ok(())
    }

    /// First registered route matching `subject`, else `Unknown`.
    pub fn resolve(&self, subject: &str) -> MessageKind {
        self.routes
            .iter()
            .find(|(pattern, _)| subjects::matches(pattern, subject))
            .map(|(_, kind)| *kind)
            .unwrap_or(MessageKind::Unknown)
    }
}

impl Default for SubjectRouter {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_routes() {
        let r = SubjectRouter::standard();
        r.validate().unwrap();
        assert_eq!(r.resolve(EVENTS_EVENT), MessageKind::Event);
        assert_eq!(r.resolve(EVENTS_METRICS), MessageKind::DeviceMetric);
        assert_eq!(r.resolve("events.security"), MessageKind::Unknown);
    }

    #[test]
    fn test_first_match_wins() {
        let r = SubjectRouter::new("events.>")
            .route("events.metrics.cpu", MessageKind::DeviceMetric)
            .route("events.>", MessageKind::Event);
        r.validate().unwrap();
        assert_eq!(r.resolve("events.metrics.cpu"), MessageKind::DeviceMetric);
        assert_eq!(r.resolve("events.other"), MessageKind::Event);
    }

    #[test]
    fn test_validation_failures() {
        assert_eq!(SubjectRouter::new(EVENTS_WILDCARD).validate(), Err(RouterError::Empty));

        let dup = SubjectRouter::standard().route(EVENTS_EVENT, MessageKind::Event);
        assert_eq!(dup.validate(), Err(RouterError::Duplicate(EVENTS_EVENT.into())));

        let unreachable = SubjectRouter::standard().route("reader.query", MessageKind::Event);
        assert!(matches!(unreachable.validate(), Err(RouterError::Unreachable { .. })));

        let malformed = SubjectRouter::standard().route("events..x", MessageKind::Event);
        assert!(matches!(malformed.validate(), Err(RouterError::Subject(_))));
    }
}
