//! Single-flight instance storage shared by the caching contexts.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::{ContextState, CreateFn};
use crate::creator::Instance;
use crate::error::{LocatorError, Result};
use crate::registry::SystemDescriptor;

struct Created<K> {
    key: K,
    descriptor: Arc<SystemDescriptor>,
    instance: Instance,
}

/// Instances keyed by `K`, constructed at most once per key.
///
/// Concurrent first requests for one key block on a shared cell so exactly
/// one construction runs; requests for other keys never wait on it. A failed
/// construction leaves the cell empty.
pub(crate) struct InstanceStore<K> {
    cells: Mutex<HashMap<K, Arc<OnceCell<Instance>>>>,
    created: Mutex<Vec<Created<K>>>,
    closed: AtomicBool,
}

impl<K: Eq + Hash + Clone> InstanceStore<K> {
    pub(crate) fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> ContextState {
        if self.closed.load(Ordering::Acquire) {
            ContextState::Destroyed
        } else if self.created.lock().is_empty() {
            ContextState::Uninitialized
        } else {
            ContextState::Active
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn find(&self, key: &K) -> Option<Instance> {
        if self.is_closed() {
            return None;
        }
        self.cells.lock().get(key).and_then(|cell| cell.get().cloned())
    }

    pub(crate) fn find_or_create(
        &self,
        key: K,
        descriptor: &Arc<SystemDescriptor>,
        scope: &str,
        create: &mut CreateFn<'_>,
    ) -> Result<Instance> {
        if self.is_closed() {
            return Err(LocatorError::ContextDestroyed(scope.to_string()));
        }

        let cell = self.cells.lock().entry(key.clone()).or_default().clone();

        let mut created_here = false;
        let instance = cell
            .get_or_try_init(|| {
                let instance = create()?;
                created_here = true;
                Ok::<_, LocatorError>(instance)
            })?
            .clone();

        if created_here {
            let mut created = self.created.lock();
            if self.is_closed() {
                // Destroyed while constructing; the drain already ran without us.
                drop(created);
                self.cells.lock().remove(&key);
                dispose(descriptor, &instance);
                return Err(LocatorError::ContextDestroyed(scope.to_string()));
            }
            if !self.is_current(&key, &cell) {
                // Released by `destroy_one` while constructing.
                drop(created);
                dispose(descriptor, &instance);
                return Err(released(descriptor));
            }
            tracing::debug!(
                scope,
                implementation = descriptor.implementation(),
                "Created instance"
            );
            created.push(Created {
                key,
                descriptor: descriptor.clone(),
                instance: instance.clone(),
            });
        } else if self.is_closed() {
            return Err(LocatorError::ContextDestroyed(scope.to_string()));
        } else if !self.is_current(&key, &cell) {
            return Err(released(descriptor));
        }

        Ok(instance)
    }

    fn is_current(&self, key: &K, cell: &Arc<OnceCell<Instance>>) -> bool {
        self.cells
            .lock()
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, cell))
    }

    /// Releases the instance stored under `key`, if any.
    pub(crate) fn destroy_one(&self, key: &K) -> Result<()> {
        self.cells.lock().remove(key);
        let entry = {
            let mut created = self.created.lock();
            created
                .iter()
                .position(|c| &c.key == key)
                .map(|pos| created.remove(pos))
        };
        match entry {
            Some(c) => dispose(&c.descriptor, &c.instance).map_or(Ok(()), Err),
            None => Ok(()),
        }
    }

    /// Closes the store and runs every pre-destroy hook, newest first.
    ///
    /// Hook failures are logged and collected; they never stop the drain.
    /// A second call finds nothing to drain.
    pub(crate) fn close(&self, scope: &str) -> Vec<LocatorError> {
        let drained = {
            let mut created = self.created.lock();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Vec::new();
            }
            std::mem::take(&mut *created)
        };
        self.cells.lock().clear();

        tracing::debug!(scope, instances = drained.len(), "Destroying context");
        drained
            .iter()
            .rev()
            .filter_map(|c| dispose(&c.descriptor, &c.instance))
            .collect()
    }
}

fn released(descriptor: &SystemDescriptor) -> LocatorError {
    LocatorError::State(format!(
        "{} was released while it was being created",
        descriptor.implementation()
    ))
}

fn dispose(descriptor: &SystemDescriptor, instance: &Instance) -> Option<LocatorError> {
    match descriptor.creator().dispose(instance) {
        Ok(()) => None,
        Err(source) => {
            tracing::warn!(
                implementation = descriptor.implementation(),
                error = %source,
                "Pre-destroy hook failed"
            );
            Some(LocatorError::Instantiation {
                implementation: descriptor.implementation().to_string(),
                source,
            })
        }
    }
}
