use super::*;
use crate::compile::{CompilerService, IrToolchain};
use crate::source::TemplateSource;
use crate::template::{CodeGenerator, ParseError};
use crate::types::{ClassName, SourcePos, TemplateBaseType, TypeContext};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Barrier};
use std::thread;
use std::time::Duration;

fn build(key: &str) -> Result<CompiledTemplate, TemplateError> {
    let model_type = ModelType::dynamic();
    let context = TypeContext::new(
        ClassName::for_template(key, &model_type),
        TemplateBaseType::html(),
        model_type,
    );
    let unit = CodeGenerator::new().generate(&TemplateSource::new(key, "hi"), &[], &context)?;
    CompilerService::new(Arc::new(IrToolchain)).compile(&unit, &context)
}

fn key(template: &str) -> CacheKey {
    CacheKey::new(template, &ModelType::dynamic())
}

fn parse_failure(template: &str) -> TemplateError {
    TemplateError::Parse(ParseError::new(template, SourcePos::new(1, 1), "broken"))
}

#[test]
fn test_success_is_stored_and_shared() {
    let cache = TemplateCache::new();
    let key = key("index");

    let first = cache.get_or_compile(&key, || build("index")).unwrap();
    let second = cache
        .get_or_compile(&key, || panic!("must not compile twice"))
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(cache.contains(&key));
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.entry(&key).unwrap().key, key);
}

#[test]
fn test_keys_differ_by_model_type() {
    let cache = TemplateCache::new();
    let dynamic = CacheKey::new("index", &ModelType::dynamic());
    let typed = CacheKey::new("index", &ModelType::opaque("Person"));
    cache.get_or_compile(&dynamic, || build("index")).unwrap();

    assert!(!cache.contains(&typed));
    let calls = AtomicUsize::new(0);
    cache
        .get_or_compile(&typed, || {
            calls.fetch_add(1, Ordering::SeqCst);
            build("index")
        })
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_failure_is_not_cached() {
    let cache = TemplateCache::new();
    let key = key("broken");

    let err = cache
        .get_or_compile(&key, || Err(parse_failure("broken")))
        .unwrap_err();
    assert!(matches!(err, TemplateError::Parse(_)));
    assert!(!cache.contains(&key));
    assert!(cache.is_empty());

    // The key stays compilable
    assert!(cache.get_or_compile(&key, || build("broken")).is_ok());
}

#[test]
fn test_concurrent_callers_compile_once() {
    let cache = TemplateCache::new();
    let key = key("shared");
    let compilations = AtomicUsize::new(0);
    let barrier = Barrier::new(8);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache.get_or_compile(&key, || {
                        compilations.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(100));
                        build("shared")
                    })
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(compilations.load(Ordering::SeqCst), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert!(Arc::ptr_eq(first, result.as_ref().unwrap()));
    }
}

#[test]
fn test_waiters_observe_failure() {
    let cache = TemplateCache::new();
    let key = key("bad");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (cache, key) = (&cache, &key);

    thread::scope(|scope| {
        let leader = scope.spawn(move || {
            cache.get_or_compile(&key, || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Err(parse_failure("bad"))
            })
        });
        started_rx.recv().unwrap();

        let waiter = scope.spawn(|| {
            cache.get_or_compile(&key, || panic!("waiter must not compile"))
        });
        // Give the waiter time to block on the in-flight slot
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        assert!(matches!(leader.join().unwrap(), Err(TemplateError::Parse(_))));
        assert!(matches!(waiter.join().unwrap(), Err(TemplateError::Parse(_))));
    });
    assert!(cache.is_empty());
}

#[test]
fn test_different_keys_compile_in_parallel() {
    let cache = TemplateCache::new();
    let (a_started_tx, a_started_rx) = mpsc::channel();
    let (b_done_tx, b_done_rx) = mpsc::channel();
    let cache = &cache;

    thread::scope(|scope| {
        let a = scope.spawn(move || {
            cache.get_or_compile(&key("a"), || {
                a_started_tx.send(()).unwrap();
                // Only finishes if "b" can compile while "a" is in flight
                b_done_rx
                    .recv_timeout(Duration::from_secs(5))
                    .expect("b compiled while a was in flight");
                build("a")
            })
        });
        a_started_rx.recv().unwrap();

        cache
            .get_or_compile(&key("b"), || build("b"))
            .unwrap();
        b_done_tx.send(()).unwrap();
        assert!(a.join().unwrap().is_ok());
    });
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_leader_panic_aborts_waiters() {
    let cache = TemplateCache::new();
    let key = key("panics");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (cache, key) = (&cache, &key);

    thread::scope(|scope| {
        let leader = scope.spawn(move || {
            cache.get_or_compile(&key, || -> Result<CompiledTemplate, TemplateError> {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                panic!("toolchain crashed");
            })
        });
        started_rx.recv().unwrap();
        let waiter = scope.spawn(|| cache.get_or_compile(&key, || build("panics")));
        thread::sleep(Duration::from_millis(100));
        release_tx.send(()).unwrap();

        assert!(leader.join().is_err());
        let err = waiter.join().unwrap().unwrap_err();
        assert_eq!(err.execution_cause(), Some(&ExecutionCause::CompilationAborted));
    });

    assert!(!cache.contains(&key));
    assert!(cache.get_or_compile(&key, || build("panics")).is_ok());
}

#[test]
fn test_invalidate_removes_all_model_types() {
    let cache = TemplateCache::new();
    let dynamic = CacheKey::new("page", &ModelType::dynamic());
    let typed = CacheKey::new("page", &ModelType::opaque("Person"));
    let other = key("other");
    for key in [&dynamic, &typed, &other] {
        cache.get_or_compile(key, || build(key.template())).unwrap();
    }

    assert_eq!(cache.invalidate("page"), 2);
    assert!(!cache.contains(&dynamic));
    assert!(!cache.contains(&typed));
    assert!(cache.contains(&other));
    assert_eq!(cache.invalidate("page"), 0);

    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_invalidate_detaches_in_flight_compilation() {
    let cache = TemplateCache::new();
    let key = key("busy");
    let (started_tx, started_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (cache, key) = (&cache, &key);

    thread::scope(|scope| {
        let leader = scope.spawn(move || {
            cache.get_or_compile(&key, || {
                started_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                build("busy")
            })
        });
        started_rx.recv().unwrap();
        cache.invalidate("busy");
        release_tx.send(()).unwrap();

        // The leader still gets its result
        assert!(leader.join().unwrap().is_ok());
    });

    // but it was not stored
    assert!(!cache.contains(&key));
}
