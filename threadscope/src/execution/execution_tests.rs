//! Scenarios for scoped execution.

#[cfg(test)]
mod tests {
    use crate::context::{ContextRegistry, GLOBAL_REGISTRY};
    use crate::errors::{BoxError, ScopeError};
    use crate::execution::{executor, ScopedExecution};
    use crate::scope::{Scope, ScopeProvider};
    use crate::testing::{CallbackRecorder, CountingFactory};
    use pretty_assertions::assert_eq;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::Arc;
    use std::thread;

    fn fixture() -> (Arc<ContextRegistry>, ScopeProvider) {
        let registry = Arc::new(ContextRegistry::new());
        let provider = ScopeProvider::new(registry.clone());
        (registry, provider)
    }

    #[test]
    fn test_fresh_context_is_deleted_afterwards() {
        let (registry, provider) = fixture();
        let counter = CountingFactory::new();

        let seen_key = ScopedExecution::new(registry.clone())
            .call(|| {
                let bean = provider.get("y", &counter.producing(5_i64))?;
                assert!(bean.is_some());
                Ok::<_, ScopeError>(registry.current_key())
            })
            .unwrap();

        assert!(seen_key.is_some());
        assert_eq!(counter.calls(), 1);
        assert!(!registry.is_registered());
        assert_eq!(registry.active_contexts(), 0);
        assert!(provider.get("y", &counter.producing(5_i64)).unwrap().is_none());
        assert!(matches!(
            registry.context_attributes(),
            Err(ScopeError::NoContextBound)
        ));
    }

    #[test]
    fn test_failure_cleans_up_and_surfaces_original_error() {
        let (registry, _) = fixture();
        let recorder = CallbackRecorder::new();

        let err = ScopedExecution::new(registry.clone())
            .call(|| -> Result<(), std::io::Error> {
                registry
                    .context_attributes()
                    .unwrap()
                    .register_destruction_callback("cleanup", recorder.callback("cleanup"))
                    .unwrap();
                Err(std::io::Error::other("work failed"))
            })
            .unwrap_err();

        assert!(matches!(err, ScopeError::Work(_)));
        assert_eq!(err.to_string(), "Unit of work failed: work failed");
        assert_eq!(recorder.calls(), vec!["cleanup"]);
        assert!(!registry.is_registered());
        assert_eq!(registry.active_contexts(), 0);
    }

    #[test]
    fn test_scope_errors_from_work_pass_through() {
        let (registry, _) = fixture();

        let err = ScopedExecution::new(registry.clone())
            .call(|| -> Result<(), ScopeError> { Err(ScopeError::invalid_argument("bad name")) })
            .unwrap_err();

        assert!(matches!(err, ScopeError::InvalidArgument(ref msg) if msg == "bad name"));
        assert!(!registry.is_registered());
    }

    #[test]
    fn test_boxed_errors_from_work() {
        let (registry, _) = fixture();
        let fails_boxed = |err: BoxError| -> Result<u8, BoxError> { Err(err) };

        let err = ScopedExecution::new(registry.clone())
            .call(|| -> Result<u8, ScopeError> { Ok(fails_boxed("connection refused".into())?) })
            .unwrap_err();
        assert!(matches!(err, ScopeError::Work(_)));
        assert_eq!(err.to_string(), "Unit of work failed: connection refused");

        let err = ScopedExecution::new(registry.clone())
            .call(|| -> Result<u8, ScopeError> {
                Ok(fails_boxed(Box::new(ScopeError::NoContextBound))?)
            })
            .unwrap_err();
        assert!(matches!(err, ScopeError::NoContextBound));
        assert_eq!(registry.active_contexts(), 0);
    }

    #[test]
    fn test_panic_still_cleans_up() {
        let (registry, _) = fixture();
        let recorder = CallbackRecorder::new();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            ScopedExecution::new(registry.clone()).run(|| {
                registry
                    .context_attributes()
                    .unwrap()
                    .register_destruction_callback("on-panic", recorder.callback("on-panic"))
                    .unwrap();
                panic!("work panicked");
            })
        }));

        assert!(outcome.is_err());
        assert_eq!(recorder.calls(), vec!["on-panic"]);
        assert!(!registry.is_registered());
        assert_eq!(registry.active_contexts(), 0);
    }

    #[test]
    fn test_nested_execution_is_pass_through() {
        let (registry, _) = fixture();
        let outer = ScopedExecution::new(registry.clone());

        outer
            .run(|| {
                let key = registry.current_key();
                ScopedExecution::new(registry.clone())
                    .run(|| assert_eq!(registry.current_key(), key))
                    .unwrap();
                // Inner bracket must not have torn anything down.
                assert_eq!(registry.current_key(), key);
                assert_eq!(registry.active_contexts(), 1);
            })
            .unwrap();

        assert_eq!(registry.active_contexts(), 0);
    }

    #[test]
    fn test_explicit_key_registers_and_deregisters() {
        let (registry, provider) = fixture();
        let key = registry.create_context();
        let counter = CountingFactory::new();

        for _ in 0..2 {
            ScopedExecution::in_context(registry.clone(), key)
                .run(|| {
                    assert_eq!(registry.current_key(), Some(key));
                    provider.get("shared", &counter.producing("v")).unwrap();
                })
                .unwrap();
            assert!(!registry.is_registered());
        }

        assert_eq!(counter.calls(), 1);
        assert!(registry.contains_context(&key));
        registry.delete_context(&key);
    }

    #[test]
    fn test_explicit_key_to_deleted_context_fails_without_running() {
        let (registry, _) = fixture();
        let key = registry.create_context();
        registry.delete_context(&key);
        let mut ran = false;

        let err = ScopedExecution::in_context(registry.clone(), key)
            .run(|| ran = true)
            .unwrap_err();

        assert!(matches!(err, ScopeError::ContextNotFound { .. }));
        assert!(!ran);
        assert!(!registry.is_registered());
    }

    #[test]
    fn test_wrapped_tasks_on_worker_threads() {
        let (registry, provider) = fixture();
        let key = registry.start_scope().unwrap();
        let counter = CountingFactory::new();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let provider = provider.clone();
                let counter = counter.clone();
                let task = ScopedExecution::in_context(registry.clone(), key).wrap(move || {
                    let bean = provider.get("shared", &counter.producing(99_u32))?;
                    Ok::<_, ScopeError>(bean.and_then(|b| b.downcast_ref::<u32>().copied()))
                });
                thread::spawn(task)
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), Some(99));
        }

        assert_eq!(counter.calls(), 1);
        assert_eq!(registry.current_key(), Some(key));
        registry.stop_scope(&key);
        assert_eq!(registry.active_contexts(), 0);
    }

    #[test]
    fn test_wrap_run_on_pooled_thread_leaves_no_binding() {
        let (registry, _) = fixture();
        let key = registry.create_context();
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let observer = registry.clone();
        let sink = observed.clone();
        let task = ScopedExecution::in_context(registry.clone(), key)
            .wrap_run(move || sink.lock().push(observer.current_key()));

        let worker_registry = registry.clone();
        let after = thread::spawn(move || {
            task().unwrap();
            worker_registry.is_registered()
        })
        .join()
        .unwrap();

        assert!(!after);
        assert_eq!(*observed.lock(), vec![Some(key)]);
        registry.delete_context(&key);
    }

    #[test]
    fn test_executor_facade() {
        let recorder = CallbackRecorder::new();

        executor::execute(|| {
            executor::scope_provider()
                .register_destruction_callback("facade", Box::new(recorder.callback("facade")))
                .unwrap();
        })
        .unwrap();

        assert_eq!(recorder.calls(), vec!["facade"]);
        assert!(!GLOBAL_REGISTRY.is_registered());
    }
}
