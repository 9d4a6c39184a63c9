//! Scope contexts: single-flight construction, teardown and request boundaries.

mod common;

use std::sync::mpsc;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use warden::{
    creator, Context, ContextState, DescriptorBuilder, DescriptorId, Locator, LocatorError,
    Lookup, RequestContext, REQUEST, SINGLETON,
};

use common::{bind, init_tracing, Counter};

struct Expensive {
    id: usize,
}

#[derive(Debug)]
struct RequestData {
    user: String,
}

#[test]
fn test_singleton_constructed_once_under_contention() {
    init_tracing();
    const THREADS: usize = 16;

    let locator = Locator::new("app");
    let created = Counter::default();
    let counter = created.clone();
    bind(
        &locator,
        DescriptorBuilder::link_type::<Expensive>()
            .in_scope(SINGLETON)
            .build_with(creator::from_fn(move |_| {
                thread::sleep(Duration::from_millis(20));
                Ok(Expensive { id: counter.bump() })
            })),
    );

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let locator = locator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                locator.get_service::<Expensive>().expect("resolve")
            })
        })
        .collect();

    let instances: Vec<Arc<Expensive>> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect();

    assert_eq!(created.get(), 1);
    assert!(instances.iter().all(|i| Arc::ptr_eq(i, &instances[0])));
    assert_eq!(instances[0].id, 1);
}

#[test]
fn test_unrelated_singletons_do_not_wait_on_each_other() {
    init_tracing();
    let locator = Locator::new("app");
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let release_rx = parking_lot::Mutex::new(release_rx);
    let entered_tx = parking_lot::Mutex::new(entered_tx);

    bind(
        &locator,
        DescriptorBuilder::link("app::Slow")
            .in_scope(SINGLETON)
            .build_with(creator::from_fn(move |_| {
                entered_tx.lock().send(()).ok();
                release_rx.lock().recv().ok();
                Ok(())
            })),
    );
    bind(
        &locator,
        DescriptorBuilder::link("app::Fast")
            .in_scope(SINGLETON)
            .build_with(creator::from_fn(|_| Ok(1u8))),
    );

    let slow = {
        let locator = locator.clone();
        thread::spawn(move || locator.resolve(&Lookup::contract("app::Slow")).map(|_| ()))
    };
    entered_rx.recv().expect("slow construction started");

    // Slow is mid-construction; Fast must still resolve.
    let fast = locator.resolve(&Lookup::contract("app::Fast")).unwrap();
    assert_eq!(*fast.downcast::<u8>().unwrap(), 1);

    release_tx.send(()).unwrap();
    slow.join().expect("thread panicked").unwrap();
}

#[test]
fn test_shutdown_twice_disposes_once() {
    init_tracing();
    let locator = Locator::new("app");
    let disposed = Counter::default();
    let counter = disposed.clone();
    bind(
        &locator,
        DescriptorBuilder::link_type::<Expensive>()
            .in_scope(SINGLETON)
            .build_with(
                creator::from_fn(|_| Ok(Expensive { id: 7 })).on_dispose(move |_| {
                    counter.bump();
                    Ok(())
                }),
            ),
    );
    locator.get_service::<Expensive>().unwrap();

    let singleton = locator.context(SINGLETON).unwrap();
    assert_eq!(singleton.state(), ContextState::Active);
    assert!(singleton.shutdown().is_empty());
    assert!(singleton.shutdown().is_empty());
    assert!(locator.shutdown().is_empty());
    assert_eq!(disposed.get(), 1);
    assert_eq!(singleton.state(), ContextState::Destroyed);
}

#[test]
fn test_dispose_failures_are_collected() {
    init_tracing();
    let locator = Locator::new("app");
    let disposed = Counter::default();
    for (implementation, fails) in [("app::First", false), ("app::Broken", true), ("app::Last", false)] {
        let counter = disposed.clone();
        bind(
            &locator,
            DescriptorBuilder::link(implementation)
                .in_scope(SINGLETON)
                .build_with(creator::from_fn(|_| Ok(())).on_dispose(move |_| {
                    counter.bump();
                    if fails {
                        return Err("socket already closed".into());
                    }
                    Ok(())
                })),
        );
        locator.resolve(&Lookup::contract(implementation)).unwrap();
    }

    let errors = locator.shutdown();
    assert_eq!(disposed.get(), 3);
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        LocatorError::Instantiation { implementation, .. } => assert_eq!(implementation, "app::Broken"),
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn test_resolution_after_context_destroyed() {
    init_tracing();
    let locator = Locator::new("app");
    bind(
        &locator,
        DescriptorBuilder::link("app::Late")
            .in_scope(SINGLETON)
            .build_with(creator::from_fn(|_| Ok(()))),
    );
    locator.context(SINGLETON).unwrap().shutdown();

    let err = locator.resolve(&Lookup::contract("app::Late")).unwrap_err();
    assert!(matches!(err, LocatorError::ContextDestroyed(_)));
}

#[test]
fn test_request_scope_needs_a_boundary() {
    init_tracing();
    let request = Arc::new(RequestContext::new());
    let locator = Locator::builder("web").context(request.clone()).build().unwrap();
    bind(
        &locator,
        DescriptorBuilder::link_type::<RequestData>()
            .in_scope(REQUEST)
            .build_with(creator::from_fn(|_| {
                Ok(RequestData {
                    user: "anonymous".to_string(),
                })
            })),
    );

    let err = locator.get_service::<RequestData>().unwrap_err();
    assert!(matches!(err, LocatorError::NoActiveContext(scope) if scope == REQUEST));

    request.begin().unwrap();
    assert_eq!(locator.get_service::<RequestData>().unwrap().user, "anonymous");
    request.end().unwrap();
}

#[test]
fn test_one_instance_per_boundary() {
    init_tracing();
    let request = Arc::new(RequestContext::new());
    let locator = Locator::builder("web").context(request.clone()).build().unwrap();
    let disposed = Counter::default();
    let counter = disposed.clone();
    bind(
        &locator,
        DescriptorBuilder::link_type::<RequestData>()
            .in_scope(REQUEST)
            .build_with(
                creator::from_fn(|_| {
                    Ok(RequestData {
                        user: String::new(),
                    })
                })
                .on_dispose(move |_| {
                    counter.bump();
                    Ok(())
                }),
            ),
    );

    request.begin().unwrap();
    let first = locator.get_service::<RequestData>().unwrap();
    // Nested begin re-enters the same boundary.
    request.begin().unwrap();
    assert!(Arc::ptr_eq(&first, &locator.get_service::<RequestData>().unwrap()));
    request.end().unwrap();
    assert_eq!(disposed.get(), 0);
    request.end().unwrap();
    assert_eq!(disposed.get(), 1);

    request.begin().unwrap();
    let second = locator.get_service::<RequestData>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    request.end().unwrap();
    assert_eq!(disposed.get(), 2);
}

#[test]
fn test_boundaries_are_per_thread() {
    init_tracing();
    let request = Arc::new(RequestContext::new());
    let locator = Locator::builder("web").context(request.clone()).build().unwrap();
    bind(
        &locator,
        DescriptorBuilder::link_type::<RequestData>()
            .in_scope(REQUEST)
            .build_with(creator::from_fn(|_| {
                Ok(RequestData {
                    user: format!("{:?}", thread::current().id()),
                })
            })),
    );

    request.begin().unwrap();
    let here = locator.get_service::<RequestData>().unwrap();

    let other = {
        let locator = locator.clone();
        let request = request.clone();
        thread::spawn(move || {
            assert!(locator.get_service::<RequestData>().is_err());
            request.begin().unwrap();
            let data = locator.get_service::<RequestData>().unwrap();
            request.end().unwrap();
            data.user.clone()
        })
        .join()
        .expect("thread panicked")
    };

    assert_ne!(here.user, other);
    request.end().unwrap();
}

#[test]
fn test_shutdown_during_request_is_terminal() {
    init_tracing();
    let request = Arc::new(RequestContext::new());
    let locator = Locator::builder("web").context(request.clone()).build().unwrap();
    bind(
        &locator,
        DescriptorBuilder::link_type::<RequestData>()
            .in_scope(REQUEST)
            .build_with(creator::from_fn(|_| {
                Ok(RequestData {
                    user: String::new(),
                })
            })),
    );

    request.begin().unwrap();
    locator.get_service::<RequestData>().unwrap();
    assert!(locator.shutdown().is_empty());

    assert_eq!(request.state(), ContextState::Destroyed);
    assert!(matches!(request.begin(), Err(LocatorError::ContextDestroyed(_))));
    assert!(matches!(request.end(), Err(LocatorError::NoActiveContext(_))));
}

/// Registers `app::Slow`, whose construction parks until released.
fn bind_slow(locator: &Locator, disposed: &Counter) -> (DescriptorId, mpsc::Receiver<()>, mpsc::Sender<()>) {
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let entered_tx = parking_lot::Mutex::new(entered_tx);
    let release_rx = parking_lot::Mutex::new(release_rx);
    let counter = disposed.clone();
    let id = bind(
        locator,
        DescriptorBuilder::link("app::Slow")
            .in_scope(SINGLETON)
            .build_with(
                creator::from_fn(move |_| {
                    entered_tx.lock().send(()).ok();
                    release_rx.lock().recv().ok();
                    Ok(())
                })
                .on_dispose(move |_| {
                    counter.bump();
                    Ok(())
                }),
            ),
    );
    (id, entered_rx, release_tx)
}

fn resolve_slow_in_background(locator: &Locator) -> thread::JoinHandle<warden::Result<()>> {
    let locator = locator.clone();
    thread::spawn(move || locator.resolve(&Lookup::contract("app::Slow")).map(|_| ()))
}

#[test]
fn test_shutdown_while_constructing() {
    init_tracing();
    let locator = Locator::new("app");
    let disposed = Counter::default();
    let (id, entered, release) = bind_slow(&locator, &disposed);

    let pending = resolve_slow_in_background(&locator);
    entered.recv().expect("construction started");

    let singleton = locator.context(SINGLETON).unwrap();
    assert!(singleton.shutdown().is_empty());
    release.send(()).unwrap();

    let result = pending.join().expect("thread panicked");
    assert!(matches!(result, Err(LocatorError::ContextDestroyed(_))));
    assert_eq!(disposed.get(), 1);
    let slow = locator.registry().get(id).unwrap();
    assert!(!singleton.contains(&slow));
}

#[test]
fn test_removal_while_constructing() {
    init_tracing();
    let locator = Locator::new("app");
    let disposed = Counter::default();
    let (id, entered, release) = bind_slow(&locator, &disposed);

    let pending = resolve_slow_in_background(&locator);
    entered.recv().expect("construction started");

    let mut config = locator.configuration();
    config.remove_descriptor(id);
    config.commit().unwrap();
    release.send(()).unwrap();

    let result = pending.join().expect("thread panicked");
    assert!(matches!(result, Err(LocatorError::State(_))));
    assert_eq!(disposed.get(), 1);

    // The orphaned instance was not kept alongside a later one.
    let singleton = locator.context(SINGLETON).unwrap();
    assert_eq!(singleton.state(), ContextState::Uninitialized);
}
