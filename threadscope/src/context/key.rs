//! Context key tokens.

use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Identifies one live context in a [`ContextRegistry`](super::ContextRegistry).
///
/// Keys are only issued by the registry. Each one wraps a fresh random UUID,
/// so a key is equal only to its own copies and a deleted key is never
/// handed out again. The `Display` form is the conversation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ContextKey(Uuid);

impl ContextKey {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying identifier.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
