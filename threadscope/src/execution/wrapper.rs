//! Scope brackets around a unit of work.

use crate::context::{ContextKey, ContextRegistry};
use crate::errors::ScopeError;
use std::sync::Arc;
use tracing::{debug, error};

/// Runs units of work with the calling thread registered to a context.
///
/// - If the thread is already registered, the work runs as is.
/// - Otherwise, with an explicit key, the thread is registered to that
///   context for the duration of the work and deregistered afterwards.
/// - Otherwise a new context is started for the work and deleted afterwards.
///
/// Cleanup is done by a drop guard, so it runs when the work returns an
/// error or panics, and it never replaces the work's own failure.
#[derive(Debug, Clone)]
pub struct ScopedExecution {
    registry: Arc<ContextRegistry>,
    context_key: Option<ContextKey>,
}

impl ScopedExecution {
    /// Creates a wrapper that starts a fresh context when needed.
    #[must_use]
    pub const fn new(registry: Arc<ContextRegistry>) -> Self {
        Self {
            registry,
            context_key: None,
        }
    }

    /// Creates a wrapper that joins the context identified by `key` when needed.
    #[must_use]
    pub const fn in_context(registry: Arc<ContextRegistry>, key: ContextKey) -> Self {
        Self {
            registry,
            context_key: Some(key),
        }
    }

    /// Returns the explicit context key, if any.
    #[must_use]
    pub const fn context_key(&self) -> Option<ContextKey> {
        self.context_key
    }

    /// Runs `work` inside the scope and returns its result.
    ///
    /// A `ScopeError` returned by the work is passed through unchanged; any
    /// other error is logged and wrapped in `ScopeError::Work`.
    ///
    /// The work's error must convert into `anyhow::Error`. Work failing with
    /// a [`BoxError`](crate::errors::BoxError) converts it with `?` into
    /// `ScopeError`, which unboxes a boxed `ScopeError` and wraps the rest.
    ///
    /// # Errors
    ///
    /// Returns registration errors (the work does not run) or the work's error.
    pub fn call<T, E, F>(&self, work: F) -> Result<T, ScopeError>
    where
        F: FnOnce() -> Result<T, E>,
        E: Into<anyhow::Error>,
    {
        let guard = self.enter()?;
        let result = work();
        drop(guard);
        result.map_err(|err| wrap_failure(err.into()))
    }

    /// Runs `work`, which produces no result, inside the scope.
    ///
    /// # Errors
    ///
    /// Returns registration errors; the work does not run in that case.
    pub fn run<F>(&self, work: F) -> Result<(), ScopeError>
    where
        F: FnOnce(),
    {
        self.call(|| {
            work();
            Ok::<(), ScopeError>(())
        })
    }

    /// Turns the bracket and `work` into a task for another thread.
    pub fn wrap<T, E, F>(self, work: F) -> impl FnOnce() -> Result<T, ScopeError> + Send
    where
        F: FnOnce() -> Result<T, E> + Send,
        E: Into<anyhow::Error>,
    {
        move || self.call(work)
    }

    /// Like [`wrap`](Self::wrap) for work without a result.
    pub fn wrap_run<F>(self, work: F) -> impl FnOnce() -> Result<(), ScopeError> + Send
    where
        F: FnOnce() + Send,
    {
        move || self.run(work)
    }

    fn enter(&self) -> Result<Option<ScopeGuard<'_>>, ScopeError> {
        if let Some(current) = self.registry.current_key() {
            debug!(context_id = %current, "Thread already registered, running in its context");
            return Ok(None);
        }

        match self.context_key {
            Some(key) => {
                self.registry.register_thread_in_context(&key)?;
                Ok(Some(ScopeGuard::Registered(&self.registry)))
            }
            None => {
                let key = self.registry.start_scope()?;
                Ok(Some(ScopeGuard::Started(&self.registry, key)))
            }
        }
    }
}

enum ScopeGuard<'a> {
    /// The thread joined an existing context.
    Registered(&'a ContextRegistry),
    /// The context was started for this work.
    Started(&'a ContextRegistry, ContextKey),
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        match self {
            Self::Registered(registry) => {
                registry.deregister_thread_from_context();
            }
            Self::Started(registry, key) => {
                registry.stop_scope(key);
            }
        }
    }
}

fn wrap_failure(err: anyhow::Error) -> ScopeError {
    match err.downcast::<ScopeError>() {
        Ok(scope_error) => scope_error,
        Err(err) => {
            error!("Unit of work failed: {err:#}");
            ScopeError::Work(err.into())
        }
    }
}
