//! Event context: the mutable record threaded through one dispatch.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use plexus_core::types::EventId;

/// Source recorded when a publisher does not name one.
pub const EXTERNAL_SOURCE: &str = "external";

/// Caller-supplied context for a publish: who is publishing and any
/// metadata handlers should see next to the event data.
#[derive(Debug, Clone, Default)]
pub struct ContextData {
    /// Publishing plugin id.
    pub source: Option<String>,
    /// Free-form metadata, kept apart from the event data.
    pub metadata: Map<String, Value>,
}

impl ContextData {
    /// Context for an event published by `source`.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
            metadata: Map::new(),
        }
    }

    /// Adds a metadata entry.
    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// State of one `publish` call, passed mutably to each handler in turn.
#[derive(Debug, Clone, Serialize)]
pub struct EventContext {
    /// Unique id of this publication.
    pub event_id: EventId,
    /// Event type the context was published under.
    pub event_type: String,
    /// Publishing plugin id.
    pub source: String,
    /// Publication time.
    pub timestamp: DateTime<Utc>,
    /// Event data, in the order the publisher inserted it.
    pub data: Map<String, Value>,
    /// Metadata from the publisher's [`ContextData`].
    pub metadata: Map<String, Value>,
    /// Plugin id → result, in insertion order.
    results: Vec<(String, Value)>,
    /// Handler owner → error message, in dispatch order.
    errors: Vec<(String, String)>,
    /// Once set, stays set.
    canceled: bool,
}

impl EventContext {
    /// Creates a fresh context.
    pub fn new(event_type: &str, data: Map<String, Value>, context_data: ContextData) -> Self {
        Self {
            event_id: EventId::new(),
            event_type: event_type.to_string(),
            source: context_data
                .source
                .unwrap_or_else(|| EXTERNAL_SOURCE.to_string()),
            timestamp: Utc::now(),
            data,
            metadata: context_data.metadata,
            results: Vec::new(),
            errors: Vec::new(),
            canceled: false,
        }
    }

    /// Cancels the event. Handlers after this one only run if they
    /// subscribed with `call_if_canceled`.
    pub fn cancel(&mut self) {
        self.canceled = true;
    }

    /// Whether a handler canceled the event.
    pub fn is_canceled(&self) -> bool {
        self.canceled
    }

    /// Records a result for `owner`. A second result from the same owner
    /// replaces the first but keeps its position.
    pub fn add_result(&mut self, owner: &str, value: Value) {
        match self.results.iter_mut().find(|(id, _)| id == owner) {
            Some(entry) => entry.1 = value,
            None => self.results.push((owner.to_string(), value)),
        }
    }

    /// Results in insertion order.
    pub fn results(&self) -> &[(String, Value)] {
        &self.results
    }

    /// The result recorded by `owner`.
    pub fn result(&self, owner: &str) -> Option<&Value> {
        self.results
            .iter()
            .find(|(id, _)| id == owner)
            .map(|(_, value)| value)
    }

    /// Handler failures in dispatch order.
    pub fn errors(&self) -> &[(String, String)] {
        &self.errors
    }

    pub(crate) fn record_error(&mut self, owner: &str, message: String) {
        self.errors.push((owner.to_string(), message));
    }

    /// Gets a data value by key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Gets a string data value.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(|v| v.as_str())
    }
}
