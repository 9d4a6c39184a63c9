//! Transactional registry mutation and change notification.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;
use warden::filter::{contract_filter, name_filter};
use warden::{
    creator, ChangeSet, DescriptorBuilder, DuplicateNamePolicy, Locator, LocatorConfig,
    LocatorError, Tracker, TrackerEvent, SINGLETON,
};

use common::{bind, init_tracing, Counter};

fn unit(implementation: &str) -> DescriptorBuilder {
    DescriptorBuilder::link(implementation)
}

fn implementations(change: &[Arc<warden::SystemDescriptor>]) -> Vec<String> {
    change.iter().map(|d| d.implementation().to_string()).collect()
}

#[test]
fn test_commit_publishes_all_at_once() {
    init_tracing();
    let locator = Locator::new("app");

    let mut config = locator.configuration();
    config.add_descriptor(unit("app::A").to("app::Service").build_with(creator::from_fn(|_| Ok(()))));
    config.add_descriptor(unit("app::B").to("app::Service").build_with(creator::from_fn(|_| Ok(()))));
    assert_eq!(config.len(), 2);
    assert!(locator.get_descriptors(&contract_filter("app::Service")).is_empty());

    let change = config.commit().expect("commit failed");
    assert_eq!(implementations(&change.added), vec!["app::A", "app::B"]);
    assert_eq!(locator.get_descriptors(&contract_filter("app::Service")).len(), 2);
}

#[test]
fn test_failed_commit_leaves_registry_unchanged() {
    init_tracing();
    let locator = Locator::new("app");
    bind(&locator, unit("app::Existing").build_with(creator::from_fn(|_| Ok(()))));
    let before: Vec<_> = locator.registry().get_all().iter().map(|d| d.id()).collect();

    let mut config = locator.configuration();
    config.add_descriptor(unit("app::Fine").build_with(creator::from_fn(|_| Ok(()))));
    config.remove_matching(contract_filter("app::Existing"));
    config.add_descriptor(unit("").build_with(creator::from_fn(|_| Ok(()))));

    let err = config.commit().unwrap_err();
    assert!(matches!(err, LocatorError::Configuration(_)));

    let after: Vec<_> = locator.registry().get_all().iter().map(|d| d.id()).collect();
    assert_eq!(before, after);
    assert!(locator.get_descriptors(&contract_filter("app::Fine")).is_empty());
}

#[test]
fn test_listeners_see_net_change_in_registration_order() {
    init_tracing();
    let locator = Locator::new("app");
    let existing = bind(&locator, unit("app::Old").build_with(creator::from_fn(|_| Ok(()))));

    let seen: Arc<Mutex<Vec<String>>> = Arc::default();
    for label in ["first", "second"] {
        let seen = seen.clone();
        locator.register_listener(move |change: &ChangeSet| {
            seen.lock().push(format!(
                "{}: +{:?} -{:?}",
                label,
                implementations(&change.added),
                implementations(&change.removed)
            ));
        });
    }

    let mut config = locator.configuration();
    let transient = config.add_descriptor(unit("app::Transient").build_with(creator::from_fn(|_| Ok(()))));
    config.add_descriptor(unit("app::New").build_with(creator::from_fn(|_| Ok(()))));
    config.remove_descriptor(existing);
    config.remove_descriptor(transient);
    config.commit().expect("commit failed");

    assert_eq!(
        *seen.lock(),
        vec![
            r#"first: +["app::New"] -["app::Old"]"#.to_string(),
            r#"second: +["app::New"] -["app::Old"]"#.to_string(),
        ]
    );
}

#[test]
fn test_listener_not_called_for_failed_commit() {
    init_tracing();
    let locator = Locator::new("app");
    let calls = Counter::default();
    let counter = calls.clone();
    locator.register_listener(move |_: &ChangeSet| {
        counter.bump();
    });

    let mut config = locator.configuration();
    config.add_descriptor(unit("app::Bad").in_scope("nowhere").build_with(creator::from_fn(|_| Ok(()))));
    assert!(config.commit().is_err());
    assert_eq!(calls.get(), 0);

    bind(&locator, unit("app::Good").build_with(creator::from_fn(|_| Ok(()))));
    assert_eq!(calls.get(), 1);
}

#[test]
fn test_descriptor_visible_inside_listener() {
    init_tracing();
    let locator = Locator::new("app");
    let observer = locator.downgrade();
    let found = Counter::default();
    let counter = found.clone();
    locator.register_listener(move |change: &ChangeSet| {
        let Some(observer) = observer.upgrade() else {
            return;
        };
        for descriptor in &change.added {
            if observer.registry().get(descriptor.id()).is_some() {
                counter.bump();
            }
        }
    });

    bind(&locator, unit("app::Visible").build_with(creator::from_fn(|_| Ok(()))));
    assert_eq!(found.get(), 1);
}

#[test]
fn test_tracker_reports_appearance_and_disappearance() {
    init_tracing();
    let locator = Locator::new("app");
    let events: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = events.clone();
    let tracker = Tracker::new(["app::Plugin"], move |event: &TrackerEvent| {
        let kind = match event {
            TrackerEvent::Appeared(_) => "appeared",
            TrackerEvent::Disappeared(_) => "disappeared",
        };
        sink.lock()
            .push(format!("{} {}", kind, event.descriptor().implementation()));
    })
    .expect("tracker");
    locator.register_listener(tracker);

    let plugin = bind(
        &locator,
        unit("app::Markdown").to("app::Plugin").build_with(creator::from_fn(|_| Ok(()))),
    );
    bind(&locator, unit("app::Unrelated").build_with(creator::from_fn(|_| Ok(()))));

    let mut config = locator.configuration();
    config.remove_descriptor(plugin);
    config.commit().expect("commit failed");

    assert_eq!(
        *events.lock(),
        vec!["appeared app::Markdown", "disappeared app::Markdown"]
    );
}

#[test]
fn test_tracker_presence_filter() {
    init_tracing();
    let locator = Locator::new("app");
    let appeared = Counter::default();
    let counter = appeared.clone();
    let tracker = Tracker::new(["app::Plugin"], move |_: &TrackerEvent| {
        counter.bump();
    })
    .expect("tracker")
    .presence(Some(false));
    locator.register_listener(tracker);

    let plugin = bind(
        &locator,
        unit("app::Markdown").to("app::Plugin").build_with(creator::from_fn(|_| Ok(()))),
    );
    assert_eq!(appeared.get(), 0);

    let mut config = locator.configuration();
    config.remove_descriptor(plugin);
    config.commit().expect("commit failed");
    assert_eq!(appeared.get(), 1);
}

#[test]
fn test_duplicate_names_rejected_within_scope() {
    init_tracing();
    let config = LocatorConfig {
        duplicate_names: DuplicateNamePolicy::RejectWithinScope,
        ..LocatorConfig::default()
    };
    let locator = Locator::builder("strict").config(config).build().expect("locator");

    bind(
        &locator,
        unit("app::Primary").to("app::Db").named("db").in_scope(SINGLETON).build_with(creator::from_fn(|_| Ok(()))),
    );

    let mut clash = locator.configuration();
    clash.add_descriptor(
        unit("app::Other").to("app::Db").named("db").in_scope(SINGLETON).build_with(creator::from_fn(|_| Ok(()))),
    );
    assert!(matches!(clash.commit(), Err(LocatorError::Configuration(_))));
    assert_eq!(locator.get_descriptors(&name_filter("db")).len(), 1);

    // Different scope is fine.
    bind(
        &locator,
        unit("app::Lazy").to("app::Db").named("db").build_with(creator::from_fn(|_| Ok(()))),
    );
    assert_eq!(locator.get_descriptors(&name_filter("db")).len(), 2);
}

#[test]
fn test_duplicate_names_allowed_by_default() {
    init_tracing();
    let locator = Locator::new("lenient");
    for implementation in ["app::One", "app::Two"] {
        bind(
            &locator,
            unit(implementation).to("app::Db").named("db").build_with(creator::from_fn(|_| Ok(()))),
        );
    }
    assert_eq!(locator.get_descriptors(&name_filter("db")).len(), 2);
}

#[test]
fn test_removal_releases_cached_instance() {
    init_tracing();
    let locator = Locator::new("app");
    let disposed = Counter::default();
    let counter = disposed.clone();
    let id = bind(
        &locator,
        unit("app::Cache")
            .in_scope(SINGLETON)
            .build_with(creator::from_fn(|_| Ok(String::from("cache"))).on_dispose(move |_| {
                counter.bump();
                Ok(())
            })),
    );
    locator
        .resolve(&warden::Lookup::contract("app::Cache"))
        .expect("resolve");

    let mut config = locator.configuration();
    config.remove_descriptor(id);
    config.commit().expect("commit failed");
    assert_eq!(disposed.get(), 1);
    assert!(locator.resolve(&warden::Lookup::contract("app::Cache")).is_err());
}

#[test]
fn test_tracker_may_commit_from_its_callback() {
    init_tracing();
    let locator = Locator::new("app");
    let observer = locator.downgrade();
    let tracker = Tracker::new(["app::Plugin"], move |event: &TrackerEvent| {
        let (TrackerEvent::Appeared(_), Some(observer)) = (event, observer.upgrade()) else {
            return;
        };
        let mut config = observer.configuration();
        config.add_constant(7u8);
        config.commit().expect("nested commit failed");
    })
    .expect("tracker");
    locator.register_listener(tracker);

    let seen: Arc<Mutex<Vec<Vec<String>>>> = Arc::default();
    let sink = seen.clone();
    locator.register_listener(move |change: &ChangeSet| {
        sink.lock().push(implementations(&change.added));
    });

    bind(
        &locator,
        unit("app::Markdown").to("app::Plugin").build_with(creator::from_fn(|_| Ok(()))),
    );

    assert_eq!(*locator.get_service::<u8>().unwrap(), 7);
    assert_eq!(
        *seen.lock(),
        vec![
            vec!["app::Markdown".to_string()],
            vec![std::any::type_name::<u8>().to_string()],
        ]
    );
}
