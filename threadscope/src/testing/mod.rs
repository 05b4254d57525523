//! Testing utilities for scoped code.
//!
//! This module provides:
//! - Bean factories that count their invocations
//! - A recorder for destruction callbacks
//! - Test logging setup

mod fixtures;

pub use fixtures::{CallbackRecorder, CountingFactory};

use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `threadscope=debug`.
/// Calling it more than once is harmless.
pub fn init_test_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("threadscope=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
