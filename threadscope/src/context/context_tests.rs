//! Multi-threaded scenarios for the context module.

#[cfg(test)]
mod tests {
    use crate::context::{Bean, ContextRegistry, ScopeAttributes};
    use crate::testing::{init_test_tracing, CallbackRecorder, CountingFactory};
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn test_single_thread_lazy_creation() {
        let registry = ContextRegistry::new();
        let key = registry.create_context();
        registry.register_thread_in_context(&key).unwrap();

        let counter = CountingFactory::new();
        let attributes = registry.context_attributes().unwrap();
        let first = attributes.get_or_create("x", counter.producing(42_i32)).unwrap();
        let second = attributes.get_or_create("x", counter.producing(42_i32)).unwrap();

        assert_eq!(first.downcast_ref::<i32>(), Some(&42));
        assert_eq!(second.downcast_ref::<i32>(), Some(&42));
        assert_eq!(counter.calls(), 1);

        registry.delete_context(&key);
    }

    #[test]
    fn test_concurrent_first_access_creates_once() {
        init_test_tracing();
        const WORKERS: usize = 8;

        let registry = Arc::new(ContextRegistry::new());
        let key = registry.create_context();
        let counter = CountingFactory::new();
        let barrier = Barrier::new(WORKERS);

        let beans: Vec<Bean> = thread::scope(|s| {
            let handles: Vec<_> = (0..WORKERS)
                .map(|_| {
                    let registry = &registry;
                    let counter = &counter;
                    let barrier = &barrier;
                    s.spawn(move || {
                        registry.register_thread_in_context(&key).unwrap();
                        barrier.wait();
                        let bean = registry
                            .context_attributes()
                            .unwrap()
                            .get_or_create("shared", || {
                                thread::yield_now();
                                counter.producing(String::from("once"))()
                            })
                            .unwrap();
                        registry.deregister_thread_from_context();
                        bean
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(counter.calls(), 1);
        assert!(beans.iter().all(|bean| Arc::ptr_eq(bean, &beans[0])));

        registry.delete_context(&key);
        assert_eq!(registry.active_contexts(), 0);
    }

    #[test]
    fn test_contexts_are_isolated_between_threads() {
        let registry = Arc::new(ContextRegistry::new());
        let first = registry.create_context();
        let second = registry.create_context();

        thread::scope(|s| {
            s.spawn(|| {
                registry.register_thread_in_context(&first).unwrap();
                registry
                    .context_attributes()
                    .unwrap()
                    .get_or_create("x", || Arc::new(1_i32))
                    .unwrap();
                registry.deregister_thread_from_context();
            })
            .join()
            .unwrap();

            s.spawn(|| {
                registry.register_thread_in_context(&second).unwrap();
                let attributes = registry.context_attributes().unwrap();
                assert!(!attributes.contains("x"));
                assert!(attributes.is_empty());
                registry.deregister_thread_from_context();
            })
            .join()
            .unwrap();
        });

        assert!(registry.attributes_for(&first).unwrap().contains("x"));
        registry.delete_context(&first);
        registry.delete_context(&second);
    }

    #[test]
    fn test_bindings_are_per_thread() {
        let registry = Arc::new(ContextRegistry::new());
        let key = registry.start_scope().unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                assert!(!registry.is_registered());
                registry.register_thread_in_context(&key).unwrap();
                assert_eq!(registry.current_key(), Some(key));
                registry.deregister_thread_from_context();
            });
        });

        assert_eq!(registry.current_key(), Some(key));
        registry.stop_scope(&key);
    }

    #[test]
    fn test_workers_share_beans_and_callbacks_run_once() {
        let registry = Arc::new(ContextRegistry::new());
        let key = registry.start_scope().unwrap();
        let recorder = CallbackRecorder::new();
        let counter = CountingFactory::new();

        thread::scope(|s| {
            for worker in 0..4 {
                let registry = &registry;
                let recorder = &recorder;
                let counter = &counter;
                s.spawn(move || {
                    registry.register_thread_in_context(&key).unwrap();
                    let attributes = registry.context_attributes().unwrap();
                    attributes.get_or_create("pool", counter.producing(worker)).unwrap();
                    attributes
                        .register_destruction_callback("pool", recorder.callback("pool"))
                        .unwrap();
                    attributes
                        .register_destruction_callback(format!("worker-{worker}"), recorder.callback("worker"))
                        .unwrap();
                    registry.deregister_thread_from_context();
                });
            }
        });

        let attributes = registry.context_attributes().unwrap();
        assert_eq!(counter.calls(), 1);
        assert_eq!(attributes.pending_callbacks(), 5);

        assert!(registry.delete_context(&key).is_empty());
        assert_eq!(recorder.count_of("pool"), 1);
        assert_eq!(recorder.count_of("worker"), 4);
        assert!(!registry.is_registered());
    }

    #[test]
    fn test_deleted_context_stays_usable_through_held_attributes() {
        let registry = Arc::new(ContextRegistry::new());
        let key = registry.create_context();
        registry.register_thread_in_context(&key).unwrap();
        let held: Arc<ScopeAttributes> = registry.context_attributes().unwrap();

        thread::scope(|s| {
            s.spawn(|| {
                registry.delete_context(&key);
            });
        });

        // The binding outlived the context; new lookups fail, held handles still work.
        assert_eq!(registry.current_key(), Some(key));
        assert!(registry.context_attributes().is_err());
        assert!(held.get_or_create("late", || Arc::new(0_u8)).is_ok());
        registry.deregister_thread_from_context();
    }

    #[test]
    fn test_concurrent_deletes_run_callbacks_once() {
        let registry = Arc::new(ContextRegistry::new());
        let key = registry.create_context();
        let recorder = CallbackRecorder::new();
        let attributes = registry.attributes_for(&key).unwrap();
        for tag in ["a", "b", "c"] {
            attributes
                .register_destruction_callback(tag, recorder.callback(tag))
                .unwrap();
        }
        let barrier = Barrier::new(3);

        thread::scope(|s| {
            for _ in 0..3 {
                s.spawn(|| {
                    barrier.wait();
                    registry.delete_context(&key);
                });
            }
        });

        let mut calls = recorder.calls();
        calls.sort();
        assert_eq!(calls, vec!["a", "b", "c"]);
        assert!(!registry.contains_context(&key));
    }
}
