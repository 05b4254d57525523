//! # Threadscope
//!
//! Contexts of lazily created beans shared across the threads of one
//! logical unit of work.
//!
//! Threadscope provides:
//!
//! - **Context registry**: create contexts, bind threads to them, tear them down
//! - **Scope attributes**: create-once beans and destruction callbacks per context
//! - **Scope provider**: the seam a dependency-injection container resolves beans through
//! - **Scoped execution**: brackets that register a thread around a unit of work
//! - **Event-driven observability**: lifecycle events for monitoring
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use threadscope::prelude::*;
//! use std::sync::Arc;
//!
//! let registry = Arc::new(ContextRegistry::new());
//! let provider = ScopeProvider::new(registry.clone());
//! let key = registry.create_context();
//!
//! // Every worker joined to `key` sees the same connection.
//! let task = ScopedExecution::in_context(registry.clone(), key).wrap(move || {
//!     provider.get_typed("connection", || Connection::open())
//! });
//! std::thread::spawn(task).join().unwrap()?;
//!
//! registry.delete_context(&key);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod context;
pub mod errors;
pub mod events;
pub mod execution;
pub mod scope;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::ScopeConfig;
    pub use crate::context::{
        global_registry, Bean, CallbackFailure, ContextKey, ContextRegistry,
        DestructionCallback, ScopeAttributes, GLOBAL_REGISTRY,
    };
    pub use crate::errors::ScopeError;
    pub use crate::events::{
        CollectingEventSink, LoggingEventSink, NoOpEventSink, ScopeEventSink,
    };
    pub use crate::execution::ScopedExecution;
    pub use crate::scope::{BeanFactory, Scope, ScopeProvider};
}

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_prelude_round_trip() {
        let registry = Arc::new(ContextRegistry::new());
        let provider = ScopeProvider::new(registry.clone());
        let key = registry.create_context();

        let task = ScopedExecution::in_context(registry.clone(), key)
            .wrap(move || provider.get_typed("greeting", || String::from("hello")));
        let greeting = thread::spawn(task).join().unwrap().unwrap();

        assert_eq!(greeting.as_deref().map(String::as_str), Some("hello"));
        assert!(registry.delete_context(&key).is_empty());
    }
}
