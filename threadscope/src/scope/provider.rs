//! The `Scope` seam and its registry-backed implementation.

use crate::context::{global_registry, Bean, ContextRegistry, DestructionCallback, ScopeAttributes};
use crate::errors::ScopeError;
use std::any::Any;
use std::sync::Arc;
use tracing::debug;

/// Creates a bean value on demand.
///
/// Implemented by the host container; closures returning a [`Bean`]
/// implement it directly.
pub trait BeanFactory {
    /// Creates a new bean value.
    fn create_bean(&self) -> Bean;
}

impl<F> BeanFactory for F
where
    F: Fn() -> Bean,
{
    fn create_bean(&self) -> Bean {
        self()
    }
}

/// A bean scope as seen by a dependency-injection container.
///
/// The trait is object safe so a container can keep scopes as
/// `Arc<dyn Scope>` registered under [`Scope::scope_name`].
pub trait Scope: Send + Sync {
    /// Returns the name this scope is registered under.
    fn scope_name(&self) -> &str;

    /// Returns the bean named `name`, creating it with `factory` on first use.
    ///
    /// Returns `Ok(None)` when the calling thread has no active context.
    fn get(&self, name: &str, factory: &dyn BeanFactory) -> Result<Option<Bean>, ScopeError>;

    /// Removes the bean named `name` and returns it.
    ///
    /// # Errors
    ///
    /// Returns an illegal-state error when the calling thread has no active context.
    fn remove(&self, name: &str) -> Result<Option<Bean>, ScopeError>;

    /// Registers a callback to run when the active context completes.
    ///
    /// # Errors
    ///
    /// Returns an illegal-state error without an active context and
    /// `ScopeError::InvalidArgument` for a blank name.
    fn register_destruction_callback(
        &self,
        name: &str,
        callback: DestructionCallback,
    ) -> Result<(), ScopeError>;

    /// Resolves a contextual object for `key`. This scope exposes none.
    fn resolve_contextual_object(&self, _key: &str) -> Option<Bean> {
        None
    }

    /// Returns an identifier of the active context, for diagnostics only.
    fn conversation_id(&self) -> String;
}

/// Resolves beans in whichever context the calling thread is registered to.
#[derive(Debug, Clone)]
pub struct ScopeProvider {
    registry: Arc<ContextRegistry>,
}

impl ScopeProvider {
    /// Creates a provider backed by `registry`.
    #[must_use]
    pub const fn new(registry: Arc<ContextRegistry>) -> Self {
        Self { registry }
    }

    /// Creates a provider backed by the process-wide registry.
    #[must_use]
    pub fn global() -> Self {
        Self::new(global_registry())
    }

    /// Returns the backing registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ContextRegistry> {
        &self.registry
    }

    /// Typed variant of [`Scope::get`].
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::BeanTypeMismatch` if the bean stored under `name`
    /// is not a `T`.
    pub fn get_typed<T, F>(&self, name: &str, factory: F) -> Result<Option<Arc<T>>, ScopeError>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> T,
    {
        let Some(attributes) = self.bound_attributes() else {
            return Ok(None);
        };
        let bean = attributes.get_or_create(name, || Arc::new(factory()) as Bean)?;
        bean.downcast::<T>()
            .map(Some)
            .map_err(|_| ScopeError::BeanTypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    // A deleted context resolves like a missing one here.
    fn bound_attributes(&self) -> Option<Arc<ScopeAttributes>> {
        self.registry.context_attributes().ok()
    }
}

impl Scope for ScopeProvider {
    fn scope_name(&self) -> &str {
        &self.registry.config().scope_name
    }

    fn get(&self, name: &str, factory: &dyn BeanFactory) -> Result<Option<Bean>, ScopeError> {
        let Some(attributes) = self.bound_attributes() else {
            return Ok(None);
        };
        attributes.get_or_create(name, || factory.create_bean()).map(Some)
    }

    fn remove(&self, name: &str) -> Result<Option<Bean>, ScopeError> {
        Ok(self.registry.context_attributes()?.remove(name))
    }

    fn register_destruction_callback(
        &self,
        name: &str,
        callback: DestructionCallback,
    ) -> Result<(), ScopeError> {
        debug!(bean = name, "Registering destruction callback");
        self.registry
            .context_attributes()?
            .register_destruction_callback(name, callback)
    }

    fn conversation_id(&self) -> String {
        self.registry
            .context_id()
            .unwrap_or_else(|| self.registry.config().unbound_conversation_id.clone())
    }
}
