//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use warden::{ActiveDescriptor, DescriptorId, Locator};

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Commits a single descriptor and returns its id.
pub fn bind(locator: &Locator, active: ActiveDescriptor) -> DescriptorId {
    let mut config = locator.configuration();
    let id = config.add_descriptor(active);
    config.commit().expect("Failed to commit descriptor");
    id
}

/// Thread-safe call counter.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
