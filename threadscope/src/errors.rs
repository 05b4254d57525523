//! Error types for the threadscope crate.
//!
//! Lifecycle and protocol violations are programmer errors and always
//! surface to the caller. Failures of a unit of work run through
//! [`ScopedExecution`](crate::execution::ScopedExecution) are collapsed into
//! [`ScopeError::Work`], keeping the original error as the source.

use crate::context::ContextKey;
use std::collections::HashMap;
use thiserror::Error;

/// Boxed error carried by [`ScopeError::Work`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for scope operations.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// The calling thread tried to register while already bound to a context.
    #[error("Thread tried to be registered in context {requested} but was already registered in {current}")]
    AlreadyRegistered {
        /// The context the thread asked to join.
        requested: ContextKey,
        /// The context the thread is bound to.
        current: ContextKey,
    },

    /// The context is not present in the registry (never created or already deleted).
    #[error("Context ({key}) does not exist")]
    ContextNotFound {
        /// The missing context key.
        key: ContextKey,
    },

    /// A scope operation was made on a thread with no bound context.
    #[error("No context scoped attributes found for this thread")]
    NoContextBound,

    /// A bean factory tried to resolve the bean it is creating.
    #[error("Bean '{name}' is already being created on this thread (circular reference)")]
    CircularCreation {
        /// The bean name.
        name: String,
    },

    /// A stored bean does not have the requested type.
    #[error("Bean '{name}' is not of type {expected}")]
    BeanTypeMismatch {
        /// The bean name.
        name: String,
        /// The requested type name.
        expected: &'static str,
    },

    /// An argument was absent or blank.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A unit of work failed with an error of its own.
    #[error("Unit of work failed: {0}")]
    Work(#[source] BoxError),
}

impl ScopeError {
    /// Creates a circular creation error.
    #[must_use]
    pub fn circular_creation(name: impl Into<String>) -> Self {
        Self::CircularCreation { name: name.into() }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns true for the illegal-state family of errors.
    #[must_use]
    pub const fn is_illegal_state(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRegistered { .. }
                | Self::ContextNotFound { .. }
                | Self::NoContextBound
                | Self::CircularCreation { .. }
                | Self::BeanTypeMismatch { .. }
        )
    }

    /// Returns a stable name for the error variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AlreadyRegistered { .. } => "AlreadyRegistered",
            Self::ContextNotFound { .. } => "ContextNotFound",
            Self::NoContextBound => "NoContextBound",
            Self::CircularCreation { .. } => "CircularCreation",
            Self::BeanTypeMismatch { .. } => "BeanTypeMismatch",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Work(_) => "Work",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("type".to_string(), serde_json::json!(self.kind()));

        match self {
            Self::AlreadyRegistered { requested, current } => {
                map.insert("requested".to_string(), serde_json::json!(requested.to_string()));
                map.insert("current".to_string(), serde_json::json!(current.to_string()));
            }
            Self::ContextNotFound { key } => {
                map.insert("context_id".to_string(), serde_json::json!(key.to_string()));
            }
            Self::CircularCreation { name } | Self::BeanTypeMismatch { name, .. } => {
                map.insert("name".to_string(), serde_json::json!(name));
            }
            Self::NoContextBound | Self::InvalidArgument(_) | Self::Work(_) => {}
        }

        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

impl From<BoxError> for ScopeError {
    /// Unboxes a `ScopeError`; any other error becomes [`ScopeError::Work`].
    fn from(err: BoxError) -> Self {
        match err.downcast::<Self>() {
            Ok(scope_error) => *scope_error,
            Err(other) => Self::Work(other),
        }
    }
}
