//! Context lifecycle and thread registration.
//!
//! This module provides:
//! - Context keys identifying one live unit of work
//! - Scope attributes holding the beans shared by a context's threads
//! - The registry creating, binding and tearing down contexts

mod attributes;
#[cfg(test)]
mod context_tests;
mod key;
mod registry;

pub use attributes::{Bean, CallbackFailure, DestructionCallback, ScopeAttributes};
pub use key::ContextKey;
pub use registry::{global_registry, ContextRegistry, GLOBAL_REGISTRY};
