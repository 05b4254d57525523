//! Directory of live contexts and the per-thread context binding.

use super::{CallbackFailure, ContextKey, ScopeAttributes};
use crate::config::ScopeConfig;
use crate::errors::ScopeError;
use crate::events::{self, LoggingEventSink, NoOpEventSink, ScopeEventSink};
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use tracing::debug;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Registry id -> context the current thread is bound to in that registry.
    ///
    /// A registry can only clear the slot of the thread that drops it. Entries
    /// other threads hold for a dropped registry stay until those threads
    /// exit; registry ids are never reused, so such an entry is never read
    /// again.
    static BINDINGS: RefCell<HashMap<u64, ContextKey>> = RefCell::new(HashMap::new());
}

/// The process-wide registry used by the [`executor`](crate::execution::executor) facade.
pub static GLOBAL_REGISTRY: LazyLock<Arc<ContextRegistry>> =
    LazyLock::new(|| Arc::new(ContextRegistry::new()));

/// Returns a handle to the process-wide registry.
pub fn global_registry() -> Arc<ContextRegistry> {
    Arc::clone(&GLOBAL_REGISTRY)
}

/// Creates contexts and binds threads to them.
///
/// - A coordinator calls [`create_context`](Self::create_context) and hands the
///   key to its workers.
/// - Every thread that wants to share beans calls
///   [`register_thread_in_context`](Self::register_thread_in_context). Many
///   threads may join one context, a thread joins at most one.
/// - Threads leave with
///   [`deregister_thread_from_context`](Self::deregister_thread_from_context)
///   before going back to a pool.
/// - The coordinator ends the unit of work with
///   [`delete_context`](Self::delete_context).
///
/// Thread bindings are kept per registry, so independent registries never see
/// each other's bindings.
pub struct ContextRegistry {
    id: u64,
    contexts: DashMap<ContextKey, Arc<ScopeAttributes>>,
    config: ScopeConfig,
    event_sink: Arc<dyn ScopeEventSink>,
}

impl Default for ContextRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            contexts: DashMap::new(),
            config: ScopeConfig::default(),
            event_sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ScopeConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn ScopeEventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Logs every lifecycle event through `tracing` at debug level.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.with_event_sink(Arc::new(LoggingEventSink::debug()))
    }

    /// Returns the registry id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Creates a new context and returns its key.
    pub fn create_context(&self) -> ContextKey {
        let key = ContextKey::generate();
        self.contexts
            .entry(key)
            .or_insert_with(|| Arc::new(ScopeAttributes::new()));

        debug!(context_id = %key, scope = %self.config.scope_name, "New context is created");
        self.emit(events::CONTEXT_CREATED, &key, None);
        key
    }

    /// Binds the calling thread to the context identified by `key`.
    ///
    /// # Errors
    ///
    /// - `ScopeError::AlreadyRegistered` if the thread is bound to any context;
    ///   its binding is left unchanged.
    /// - `ScopeError::ContextNotFound` if the context does not exist.
    pub fn register_thread_in_context(&self, key: &ContextKey) -> Result<(), ScopeError> {
        if let Some(current) = self.current_key() {
            return Err(ScopeError::AlreadyRegistered {
                requested: *key,
                current,
            });
        }

        // The entry guard holds the key's shard, so the context cannot be
        // removed between the presence check and the bind.
        let entry = self
            .contexts
            .get(key)
            .ok_or(ScopeError::ContextNotFound { key: *key })?;
        self.bind(*key);
        drop(entry);

        debug!(context_id = %key, "Thread is registered to context");
        self.emit(events::THREAD_REGISTERED, key, None);
        Ok(())
    }

    /// Returns the attributes of the context bound to the calling thread.
    ///
    /// # Errors
    ///
    /// - `ScopeError::NoContextBound` if the thread is not registered.
    /// - `ScopeError::ContextNotFound` if its context was deleted meanwhile.
    pub fn context_attributes(&self) -> Result<Arc<ScopeAttributes>, ScopeError> {
        let key = self.current_key().ok_or(ScopeError::NoContextBound)?;
        self.attributes_for(&key)
    }

    /// Tears down the context identified by `key`.
    ///
    /// Runs the destruction callbacks (each isolated), removes the context from
    /// the registry and clears its beans. Removal and clearing happen in a drop
    /// guard, so they also run if callback execution unwinds. While the
    /// callbacks run the calling thread is bound to `key`; its previous
    /// binding is restored afterwards. As the last step the calling thread's
    /// binding is cleared in every case, including for an unknown key.
    ///
    /// Returns the callbacks that panicked.
    pub fn delete_context(&self, key: &ContextKey) -> Vec<CallbackFailure> {
        let attributes = self.contexts.get(key).map(|entry| Arc::clone(entry.value()));

        let failures = match attributes {
            Some(attributes) => self.tear_down(*key, attributes),
            None => {
                debug!(context_id = %key, "Context does not exist, nothing to delete");
                Vec::new()
            }
        };

        self.deregister_thread_from_context();
        failures
    }

    fn tear_down(&self, key: ContextKey, attributes: Arc<ScopeAttributes>) -> Vec<CallbackFailure> {
        let teardown = Teardown {
            contexts: &self.contexts,
            key,
            attributes: Some(Arc::clone(&attributes)),
        };
        let rebind = Rebind::to(self, key);
        let failures = attributes.context_completed();
        drop(rebind);
        let removed = teardown.finish();

        for failure in &failures {
            self.emit(
                events::CALLBACK_FAILED,
                &key,
                Some(serde_json::json!({
                    "callback": failure.name,
                    "error": failure.message,
                })),
            );
        }
        if removed {
            debug!(context_id = %key, failed_callbacks = failures.len(), "Context was deleted");
            self.emit(
                events::CONTEXT_DELETED,
                &key,
                Some(serde_json::json!({ "failed_callbacks": failures.len() })),
            );
        }
        failures
    }

    /// Clears the calling thread's binding and returns what was bound.
    ///
    /// Calling this on an unbound thread is not an error.
    pub fn deregister_thread_from_context(&self) -> Option<ContextKey> {
        let previous = self.unbind();
        if let Some(key) = previous {
            debug!(context_id = %key, "Thread is deregistered from context");
            self.emit(events::THREAD_DEREGISTERED, &key, None);
        }
        previous
    }

    /// Creates a context and registers the calling thread in it.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::AlreadyRegistered` if the thread is bound already;
    /// the context created for the call is removed again.
    pub fn start_scope(&self) -> Result<ContextKey, ScopeError> {
        let key = self.create_context();
        if let Err(err) = self.register_thread_in_context(&key) {
            self.contexts.remove(&key);
            return Err(err);
        }
        Ok(key)
    }

    /// Ends a scope started with [`start_scope`](Self::start_scope).
    pub fn stop_scope(&self, key: &ContextKey) -> Vec<CallbackFailure> {
        self.delete_context(key)
    }

    /// Returns the key bound to the calling thread.
    #[must_use]
    pub fn current_key(&self) -> Option<ContextKey> {
        BINDINGS.with(|bindings| bindings.borrow().get(&self.id).copied())
    }

    /// Returns true if the calling thread is bound to a context.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.current_key().is_some()
    }

    /// Returns the string form of the calling thread's context key.
    #[must_use]
    pub fn context_id(&self) -> Option<String> {
        self.current_key().map(|key| key.to_string())
    }

    /// Returns true if the context is live in this registry.
    #[must_use]
    pub fn contains_context(&self, key: &ContextKey) -> bool {
        self.contexts.contains_key(key)
    }

    /// Returns the number of live contexts.
    #[must_use]
    pub fn active_contexts(&self) -> usize {
        self.contexts.len()
    }

    pub(crate) fn attributes_for(&self, key: &ContextKey) -> Result<Arc<ScopeAttributes>, ScopeError> {
        self.contexts
            .get(key)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(ScopeError::ContextNotFound { key: *key })
    }

    fn bind(&self, key: ContextKey) {
        BINDINGS.with(|bindings| {
            bindings.borrow_mut().insert(self.id, key);
        });
    }

    fn unbind(&self) -> Option<ContextKey> {
        BINDINGS.with(|bindings| bindings.borrow_mut().remove(&self.id))
    }

    fn emit(&self, event_type: &str, key: &ContextKey, extra: Option<serde_json::Value>) {
        let mut payload = events::event_payload(&self.config.scope_name, key);
        if let (Some(serde_json::Value::Object(extra)), Some(fields)) = (extra, payload.as_object_mut()) {
            fields.extend(extra);
        }
        self.event_sink.try_emit(event_type, Some(payload));
    }
}

impl Drop for ContextRegistry {
    fn drop(&mut self) {
        let _ = BINDINGS.try_with(|bindings| bindings.borrow_mut().remove(&self.id));
    }
}

impl std::fmt::Debug for ContextRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextRegistry")
            .field("id", &self.id)
            .field("scope_name", &self.config.scope_name)
            .field("active_contexts", &self.active_contexts())
            .finish()
    }
}

/// Removes the context and clears its beans, on `finish` or on drop.
struct Teardown<'a> {
    contexts: &'a DashMap<ContextKey, Arc<ScopeAttributes>>,
    key: ContextKey,
    attributes: Option<Arc<ScopeAttributes>>,
}

impl Teardown<'_> {
    /// Returns true if this call removed the directory entry.
    fn finish(mut self) -> bool {
        self.release()
    }

    fn release(&mut self) -> bool {
        let Some(attributes) = self.attributes.take() else {
            return false;
        };
        let removed = self.contexts.remove(&self.key).is_some();
        attributes.clear();
        removed
    }
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Binds the thread to a context for the duration of a teardown.
struct Rebind<'a> {
    registry: &'a ContextRegistry,
    previous: Option<ContextKey>,
    active: bool,
}

impl<'a> Rebind<'a> {
    fn to(registry: &'a ContextRegistry, key: ContextKey) -> Self {
        let previous = registry.current_key();
        let active = previous != Some(key);
        if active {
            registry.bind(key);
        }
        Self {
            registry,
            previous,
            active,
        }
    }
}

impl Drop for Rebind<'_> {
    fn drop(&mut self) {
        if !self.active {
            return;
        }
        match self.previous {
            Some(previous) => self.registry.bind(previous),
            None => {
                self.registry.unbind();
            }
        }
    }
}
