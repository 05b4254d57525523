//! Scope configuration.

use serde::{Deserialize, Serialize};

/// Configuration shared by a registry and the scope providers built on it.
///
/// Derives serde traits so a host container can embed it in its own
/// configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Name the scope is registered under with the host container.
    pub scope_name: String,
    /// Conversation id reported for threads with no bound context.
    pub unbound_conversation_id: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            scope_name: "thread-shared".to_string(),
            unbound_conversation_id: "none".to_string(),
        }
    }
}

impl ScopeConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the scope name.
    #[must_use]
    pub fn with_scope_name(mut self, name: impl Into<String>) -> Self {
        self.scope_name = name.into();
        self
    }

    /// Sets the conversation id reported for unbound threads.
    #[must_use]
    pub fn with_unbound_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.unbound_conversation_id = id.into();
        self
    }
}
