//! The message envelope that travels through a pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Error information attached to an event after a failure was handled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventError {
    /// Name of the error type.
    pub error_type: String,
    /// Human readable description.
    pub message: String,
    /// The step that failed, if the failure came from a step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failing_step: Option<String>,
}

impl EventError {
    /// Creates a new event error.
    #[must_use]
    pub fn new(error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            message: message.into(),
            failing_step: None,
        }
    }

    /// Sets the failing step.
    #[must_use]
    pub fn with_failing_step(mut self, step: impl Into<String>) -> Self {
        self.failing_step = Some(step.into());
        self
    }
}

/// An immutable-by-contract message envelope.
///
/// Every content change consumes the event and returns a new value, so a
/// step can never mutate an event another stage still holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    id: Uuid,
    correlation_id: String,
    payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    variables: HashMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<EventError>,
    created_at: DateTime<Utc>,
}

impl Event {
    /// Creates a new event carrying `payload`. The correlation id defaults to the event id.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            correlation_id: id.to_string(),
            payload,
            variables: HashMap::new(),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an event with an explicit correlation id.
    #[must_use]
    pub fn correlated(payload: serde_json::Value, correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::new(payload)
        }
    }

    /// Returns the event id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Returns all variables.
    #[must_use]
    pub fn variables(&self) -> &HashMap<String, serde_json::Value> {
        &self.variables
    }

    /// Returns a single variable.
    #[must_use]
    pub fn variable(&self, key: &str) -> Option<&serde_json::Value> {
        self.variables.get(key)
    }

    /// Returns the terminal error, if one was attached.
    #[must_use]
    pub fn error(&self) -> Option<&EventError> {
        self.error.as_ref()
    }

    /// Returns when the event was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns a new event with the payload replaced.
    #[must_use]
    pub fn with_payload(self, payload: serde_json::Value) -> Self {
        Self { payload, ..self }
    }

    /// Returns a new event with a variable set.
    #[must_use]
    pub fn with_variable(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Returns a new event with an error attached.
    #[must_use]
    pub fn with_error(self, error: EventError) -> Self {
        Self {
            error: Some(error),
            ..self
        }
    }

    /// Returns a new event with the error cleared.
    #[must_use]
    pub fn without_error(self) -> Self {
        Self { error: None, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_defaults_correlation_to_id() {
        let event = Event::new(json!({"order": 1}));
        assert_eq!(event.correlation_id(), event.id().to_string());
        assert!(event.error().is_none());
        assert!(event.variables().is_empty());
    }

    #[test]
    fn test_with_payload_keeps_identity() {
        let event = Event::correlated(json!(1), "corr-1");
        let id = event.id();
        let next = event.with_payload(json!(2));

        assert_eq!(next.id(), id);
        assert_eq!(next.correlation_id(), "corr-1");
        assert_eq!(next.payload(), &json!(2));
    }

    #[test]
    fn test_original_is_untouched_by_derived_event() {
        let original = Event::new(json!("a"));
        let derived = original.clone().with_variable("k", json!(true));

        assert!(original.variable("k").is_none());
        assert_eq!(derived.variable("k"), Some(&json!(true)));
    }

    #[test]
    fn test_error_roundtrip() {
        let event = Event::new(json!(null))
            .with_error(EventError::new("db.connection", "refused").with_failing_step("store"));
        assert_eq!(event.error().map(|e| e.error_type.as_str()), Some("db.connection"));

        let json = serde_json::to_string(&event).unwrap();
        let restored: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);

        assert!(restored.without_error().error().is_none());
    }
}
