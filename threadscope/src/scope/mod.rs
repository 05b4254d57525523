//! The framework-facing scope adapter.
//!
//! A dependency-injection container resolves beans through [`Scope`]; the
//! [`ScopeProvider`] implementation delegates to the context the calling
//! thread is registered to.

mod provider;

pub use provider::{BeanFactory, Scope, ScopeProvider};
