//! Test fixtures for code running inside scopes.

use crate::context::Bean;
use parking_lot::Mutex;
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bean factories that count how often they are invoked.
///
/// Every factory produced by one `CountingFactory` shares its counter.
#[derive(Debug, Clone, Default)]
pub struct CountingFactory {
    calls: Arc<AtomicUsize>,
}

impl CountingFactory {
    /// Creates a new counting factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a factory producing clones of `value`.
    pub fn producing<T>(&self, value: T) -> impl Fn() -> Bean + Send + Sync + 'static
    where
        T: Clone + Any + Send + Sync,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Arc::new(value.clone()) as Bean
        }
    }

    /// Returns the number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Records which destruction callbacks ran, in order.
#[derive(Debug, Clone, Default)]
pub struct CallbackRecorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallbackRecorder {
    /// Creates a new recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a callback that records `tag` when run.
    pub fn callback(&self, tag: impl Into<String>) -> impl FnOnce() + Send + 'static {
        let calls = Arc::clone(&self.calls);
        let tag = tag.into();
        move || calls.lock().push(tag)
    }

    /// Returns the recorded tags, in the order the callbacks ran.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how often the callback for `tag` ran.
    #[must_use]
    pub fn count_of(&self, tag: &str) -> usize {
        self.calls.lock().iter().filter(|t| *t == tag).count()
    }
}
