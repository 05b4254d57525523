//! Shared bean and destruction-callback storage for one context.

use crate::errors::ScopeError;
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};

/// A shared object stored in a context.
pub type Bean = Arc<dyn Any + Send + Sync>;

/// A callback run once when its owning context completes.
pub type DestructionCallback = Box<dyn FnOnce() + Send>;

/// A destruction callback that panicked during teardown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackFailure {
    /// The name the callback was registered under.
    pub name: String,
    /// The panic message.
    pub message: String,
}

#[derive(Default)]
struct BeanTable {
    beans: HashMap<String, Bean>,
    /// Names whose factory is currently running on the lock-owning thread.
    in_creation: HashSet<String>,
}

/// Removes a name from `in_creation` when the factory returns or unwinds.
struct CreationMark<'a> {
    table: &'a RefCell<BeanTable>,
    name: &'a str,
}

impl Drop for CreationMark<'_> {
    fn drop(&mut self) {
        self.table.borrow_mut().in_creation.remove(self.name);
    }
}

/// The shared state of one context: beans plus destruction callbacks.
///
/// The bean lock is re-entrant so that a factory may resolve other beans of
/// the same context while the lock is held. It is never held while the
/// `RefCell` borrow is live across a call into user code.
/// Lock order is always beans, then callbacks.
#[derive(Default)]
pub struct ScopeAttributes {
    beans: ReentrantMutex<RefCell<BeanTable>>,
    /// Registration order is preserved; a name appears at most once.
    destruction_callbacks: Mutex<Vec<(String, DestructionCallback)>>,
}

impl ScopeAttributes {
    /// Creates empty attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bean stored under `name`, creating it with `factory` on a miss.
    ///
    /// The factory runs at most once per name while the entry lives, and the
    /// check, creation and insert are atomic with respect to other threads.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::CircularCreation` if the factory for `name`
    /// resolves `name` again.
    pub fn get_or_create<F>(&self, name: &str, factory: F) -> Result<Bean, ScopeError>
    where
        F: FnOnce() -> Bean,
    {
        self.try_get_or_create(name, || Ok(factory()))
    }

    /// Like [`get_or_create`](Self::get_or_create) with a fallible factory.
    ///
    /// A factory error inserts nothing and is returned unchanged.
    pub fn try_get_or_create<F, E>(&self, name: &str, factory: F) -> Result<Bean, E>
    where
        F: FnOnce() -> Result<Bean, E>,
        E: From<ScopeError>,
    {
        let beans = self.beans.lock();
        {
            let mut table = beans.borrow_mut();
            if let Some(bean) = table.beans.get(name) {
                return Ok(Arc::clone(bean));
            }
            if !table.in_creation.insert(name.to_string()) {
                return Err(ScopeError::circular_creation(name).into());
            }
        }

        let creation = CreationMark { table: &beans, name };
        let bean = factory()?;
        drop(creation);

        beans
            .borrow_mut()
            .beans
            .insert(name.to_string(), Arc::clone(&bean));
        debug!(bean = name, "Bean created in scope");
        Ok(bean)
    }

    /// Returns the bean stored under `name` without creating it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Bean> {
        self.beans.lock().borrow().beans.get(name).cloned()
    }

    /// Checks whether a bean is stored under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.beans.lock().borrow().beans.contains_key(name)
    }

    /// Removes and returns the bean stored under `name`.
    ///
    /// Destruction callbacks are independent of the bean map: one registered
    /// under `name` stays and still runs when the context completes.
    pub fn remove(&self, name: &str) -> Option<Bean> {
        self.beans.lock().borrow_mut().beans.remove(name)
    }

    /// Registers a callback to run when the context completes.
    ///
    /// A callback already registered under `name` is replaced in place.
    ///
    /// # Errors
    ///
    /// Returns `ScopeError::InvalidArgument` if `name` is blank.
    pub fn register_destruction_callback<F>(
        &self,
        name: impl Into<String>,
        callback: F,
    ) -> Result<(), ScopeError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ScopeError::invalid_argument("Name must not be blank"));
        }

        let callback: DestructionCallback = Box::new(callback);
        let replaced = {
            let mut callbacks = self.destruction_callbacks.lock();
            if let Some(index) = callbacks.iter().position(|(registered, _)| *registered == name) {
                Some(std::mem::replace(&mut callbacks[index].1, callback))
            } else {
                callbacks.push((name, callback));
                None
            }
        };
        drop(replaced);
        Ok(())
    }

    /// Signals that the context has completed and runs its destruction callbacks.
    ///
    /// The callbacks are taken out under the lock and run outside it, in
    /// registration order, so a callback may register state of its own.
    /// Each callback is isolated: a panic is logged and reported and the
    /// remaining callbacks still run.
    pub fn context_completed(&self) -> Vec<CallbackFailure> {
        let callbacks = std::mem::take(&mut *self.destruction_callbacks.lock());
        let mut failures = Vec::new();

        for (name, callback) in callbacks {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
                let message = panic_message(panic.as_ref());
                warn!(callback = %name, error = %message, "Destruction callback panicked");
                failures.push(CallbackFailure { name, message });
            }
        }

        failures
    }

    /// Removes every bean. Destruction callbacks are left untouched.
    pub fn clear(&self) {
        let beans = self.beans.lock();
        let drained = std::mem::take(&mut beans.borrow_mut().beans);
        drop(beans);
        drop(drained);
    }

    /// Returns the number of stored beans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.beans.lock().borrow().beans.len()
    }

    /// Returns true if no bean is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beans.lock().borrow().beans.is_empty()
    }

    /// Returns the stored bean names, sorted.
    #[must_use]
    pub fn bean_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.beans.lock().borrow().beans.keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered destruction callbacks.
    #[must_use]
    pub fn pending_callbacks(&self) -> usize {
        self.destruction_callbacks.lock().len()
    }
}

impl std::fmt::Debug for ScopeAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeAttributes")
            .field("beans", &self.bean_names())
            .field("pending_callbacks", &self.pending_callbacks())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
