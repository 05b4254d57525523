//! Process-wide shortcuts over the global registry.

use super::ScopedExecution;
use crate::context::{global_registry, CallbackFailure, ContextKey, GLOBAL_REGISTRY};
use crate::errors::ScopeError;
use crate::scope::ScopeProvider;

/// Creates a context in the global registry.
pub fn create_context() -> ContextKey {
    GLOBAL_REGISTRY.create_context()
}

/// Deletes a context from the global registry.
pub fn delete_context(key: &ContextKey) -> Vec<CallbackFailure> {
    GLOBAL_REGISTRY.delete_context(key)
}

/// Runs `work` in the calling thread's context, or in a fresh one.
pub fn execute<F>(work: F) -> Result<(), ScopeError>
where
    F: FnOnce(),
{
    ScopedExecution::new(global_registry()).run(work)
}

/// Runs `work` in the calling thread's context, or in a fresh one, and returns its result.
pub fn call<T, E, F>(work: F) -> Result<T, ScopeError>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    ScopedExecution::new(global_registry()).call(work)
}

/// Runs `work` in the calling thread's context, or joins the context `key`.
pub fn execute_in<F>(key: &ContextKey, work: F) -> Result<(), ScopeError>
where
    F: FnOnce(),
{
    ScopedExecution::in_context(global_registry(), *key).run(work)
}

/// Like [`execute_in`] for work with a result.
pub fn call_in<T, E, F>(key: &ContextKey, work: F) -> Result<T, ScopeError>
where
    F: FnOnce() -> Result<T, E>,
    E: Into<anyhow::Error>,
{
    ScopedExecution::in_context(global_registry(), *key).call(work)
}

/// Returns a scope provider over the global registry.
pub fn scope_provider() -> ScopeProvider {
    ScopeProvider::global()
}
