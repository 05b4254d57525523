//! Running units of work inside a scope.
//!
//! This module provides:
//! - ScopedExecution, the register-run-cleanup bracket
//! - Executor shortcuts over the process-wide registry

#[cfg(test)]
mod execution_tests;
pub mod executor;
mod wrapper;

pub use wrapper::ScopedExecution;
