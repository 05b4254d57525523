//! Receivers for scope lifecycle events.

use crate::context::ContextKey;
use parking_lot::RwLock;
use tracing::{debug, info, trace, Level};

/// Trait for sinks receiving scope lifecycle events.
///
/// Sinks are called from inside registry operations, on whichever thread
/// performs them, so they must be cheap and must never fail.
pub trait ScopeEventSink: Send + Sync {
    /// Receives one event. `event_type` is one of the constants in
    /// [`crate::events`]; `data` carries `scope`, `context_id`, `thread`,
    /// `timestamp` and event-specific fields.
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>);
}

/// Discards every event. The registry default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl ScopeEventSink for NoOpEventSink {
    fn try_emit(&self, _event_type: &str, _data: Option<serde_json::Value>) {}
}

/// Forwards scope events to `tracing` at a fixed level.
///
/// Installed by [`ContextRegistry::with_logging`](crate::context::ContextRegistry::with_logging).
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::DEBUG }
    }
}

impl LoggingEventSink {
    /// Creates a new logging event sink with the specified level.
    #[must_use]
    pub const fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub const fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Creates an info-level logging sink.
    #[must_use]
    pub const fn info() -> Self {
        Self::new(Level::INFO)
    }

    /// Returns the level events are logged at.
    #[must_use]
    pub const fn level(&self) -> Level {
        self.level
    }
}

impl ScopeEventSink for LoggingEventSink {
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        match self.level {
            Level::TRACE => trace!(event_type = %event_type, event_data = ?data, "Scope event: {}", event_type),
            Level::DEBUG => debug!(event_type = %event_type, event_data = ?data, "Scope event: {}", event_type),
            _ => info!(event_type = %event_type, event_data = ?data, "Scope event: {}", event_type),
        }
    }
}

/// One event captured by a [`CollectingEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// The event type, one of the constants in [`crate::events`].
    pub event_type: String,
    /// The `context_id` field of the payload, if present.
    pub context_id: Option<String>,
    /// The full payload.
    pub data: Option<serde_json::Value>,
}

/// Keeps every scope event in memory, in emission order.
///
/// Meant for tests asserting on the lifecycle of one or more contexts.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    recorded: RwLock<Vec<RecordedEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.recorded.read().clone()
    }

    /// Returns the recorded event types, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.recorded.read().iter().map(|e| e.event_type.clone()).collect()
    }

    /// Returns the lifecycle of one context: the types of the events
    /// carrying its id, in emission order.
    #[must_use]
    pub fn lifecycle_of(&self, key: &ContextKey) -> Vec<String> {
        let id = key.to_string();
        self.recorded
            .read()
            .iter()
            .filter(|e| e.context_id.as_deref() == Some(id.as_str()))
            .map(|e| e.event_type.clone())
            .collect()
    }

    /// Returns the payloads of all events of `event_type`.
    #[must_use]
    pub fn payloads_of(&self, event_type: &str) -> Vec<serde_json::Value> {
        self.recorded
            .read()
            .iter()
            .filter(|e| e.event_type == event_type)
            .filter_map(|e| e.data.clone())
            .collect()
    }

    /// Returns the number of recorded events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recorded.read().len()
    }

    /// Returns true if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recorded.read().is_empty()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.recorded.write().clear();
    }
}

impl ScopeEventSink for CollectingEventSink {
    fn try_emit(&self, event_type: &str, data: Option<serde_json::Value>) {
        let context_id = data
            .as_ref()
            .and_then(|d| d.get("context_id"))
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        self.recorded.write().push(RecordedEvent {
            event_type: event_type.to_string(),
            context_id,
            data,
        });
    }
}
