//! Scope lifecycle events.
//!
//! A [`ContextRegistry`](crate::context::ContextRegistry) reports context
//! creation and deletion, thread registration and isolated callback failures
//! to a [`ScopeEventSink`]. The default sink discards everything.

mod sink;

pub use sink::{
    CollectingEventSink, LoggingEventSink, NoOpEventSink, RecordedEvent, ScopeEventSink,
};

use crate::context::ContextKey;

/// Emitted after a context is inserted into the registry.
pub const CONTEXT_CREATED: &str = "context.created";
/// Emitted after a context is torn down and removed.
pub const CONTEXT_DELETED: &str = "context.deleted";
/// Emitted after a thread binds to a context.
pub const THREAD_REGISTERED: &str = "thread.registered";
/// Emitted after a bound thread is released from its context.
pub const THREAD_DEREGISTERED: &str = "thread.deregistered";
/// Emitted for each destruction callback that panicked during teardown.
pub const CALLBACK_FAILED: &str = "callback.failed";

/// Builds the common event payload for a context.
pub(crate) fn event_payload(scope: &str, key: &ContextKey) -> serde_json::Value {
    serde_json::json!({
        "scope": scope,
        "context_id": key.to_string(),
        "thread": format!("{:?}", std::thread::current().id()),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}
