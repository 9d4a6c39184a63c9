//! Request-boundary scope.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use ulid::Ulid;

use super::ambient::{self, Activation};
use super::store::InstanceStore;
use super::{Context, ContextState, CreateFn, REQUEST};
use crate::creator::Instance;
use crate::descriptor::DescriptorId;
use crate::error::{LocatorError, Result};
use crate::locator::{Locator, WeakLocator};
use crate::registry::SystemDescriptor;

/// Identity of one request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryId(Ulid);

impl BoundaryId {
    fn new() -> Self {
        Self(Ulid::new())
    }
}

impl fmt::Display for BoundaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One instance per descriptor per request boundary.
///
/// A boundary is opened with [`begin`](Self::begin) on the thread handling
/// the request and closed with [`end`](Self::end). Lookups resolve against
/// the calling thread's active boundary; without one they fail with
/// `NoActiveContext`. Instances of this scope are proxiable: components of
/// longer-lived scopes receive a proxy that re-resolves on every call.
///
/// ```ignore
/// let request = Arc::new(RequestContext::new());
/// locator.add_context(request.clone())?;
///
/// request.begin()?;
/// let data = locator.get_service::<RequestData>()?;
/// request.end()?;
/// ```
pub struct RequestContext {
    id: Ulid,
    scope: String,
    locator: OnceCell<WeakLocator>,
    started: AtomicBool,
    destroyed: AtomicBool,
    boundaries: Mutex<HashMap<BoundaryId, Arc<InstanceStore<DescriptorId>>>>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::with_scope(REQUEST)
    }

    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            scope: scope.into(),
            locator: OnceCell::new(),
            started: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            boundaries: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a boundary on the calling thread.
    ///
    /// If the thread already has an active boundary in this context it is
    /// re-entered and returned; each nested `begin` then needs its own `end`.
    pub fn begin(&self) -> Result<BoundaryId> {
        self.ensure_alive()?;
        if let Some(boundary) = ambient::reenter(self.id) {
            return Ok(boundary);
        }

        let locator = self.locator.get().cloned().ok_or_else(|| {
            LocatorError::State(format!(
                "request context '{}' is not installed in a locator",
                self.scope
            ))
        })?;

        let boundary = BoundaryId::new();
        self.boundaries
            .lock()
            .insert(boundary, Arc::new(InstanceStore::new()));
        ambient::activate(Activation::new(&self.scope, self.id, boundary, locator));
        self.started.store(true, Ordering::Release);

        tracing::debug!(scope = %self.scope, %boundary, "Began request boundary");
        Ok(boundary)
    }

    /// The calling thread's active boundary.
    pub fn current(&self) -> Option<BoundaryId> {
        ambient::boundary_for(self.id)
    }

    /// Deactivates the calling thread's boundary without destroying it.
    pub fn suspend(&self) -> Option<BoundaryId> {
        ambient::deactivate(self.id).map(|activation| activation.boundary)
    }

    /// Makes a live boundary the calling thread's active one.
    pub fn resume(&self, boundary: BoundaryId) -> Result<()> {
        self.ensure_alive()?;
        if !self.boundaries.lock().contains_key(&boundary) {
            return Err(LocatorError::ContextDestroyed(self.scope.clone()));
        }
        if self.current() == Some(boundary) {
            return Ok(());
        }
        self.suspend();

        let locator = self.locator.get().cloned().ok_or_else(|| {
            LocatorError::State(format!(
                "request context '{}' is not installed in a locator",
                self.scope
            ))
        })?;
        ambient::activate(Activation::new(&self.scope, self.id, boundary, locator));
        Ok(())
    }

    /// Leaves the calling thread's boundary, destroying it once the outermost `begin` is matched.
    ///
    /// Returns the pre-destroy failures collected while releasing instances.
    pub fn end(&self) -> Result<Vec<LocatorError>> {
        let (boundary, finished) = ambient::exit(self.id)
            .ok_or_else(|| LocatorError::NoActiveContext(self.scope.clone()))?;
        if !finished {
            return Ok(Vec::new());
        }
        Ok(self.end_boundary(boundary))
    }

    /// Destroys `boundary` wherever it is active.
    pub fn end_boundary(&self, boundary: BoundaryId) -> Vec<LocatorError> {
        ambient::purge(self.id, Some(boundary));
        let store = self.boundaries.lock().remove(&boundary);
        match store {
            Some(store) => {
                tracing::debug!(scope = %self.scope, %boundary, "Ended request boundary");
                store.close(&self.scope)
            }
            None => Vec::new(),
        }
    }

    /// Number of live boundaries.
    pub fn boundary_count(&self) -> usize {
        self.boundaries.lock().len()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(LocatorError::ContextDestroyed(self.scope.clone()));
        }
        Ok(())
    }

    fn active_store(&self) -> Result<Arc<InstanceStore<DescriptorId>>> {
        self.ensure_alive()?;
        let boundary = self
            .current()
            .ok_or_else(|| LocatorError::NoActiveContext(self.scope.clone()))?;
        self.boundaries
            .lock()
            .get(&boundary)
            .cloned()
            .ok_or_else(|| LocatorError::ContextDestroyed(self.scope.clone()))
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for RequestContext {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn state(&self) -> ContextState {
        if self.destroyed.load(Ordering::Acquire) {
            ContextState::Destroyed
        } else if self.started.load(Ordering::Acquire) {
            ContextState::Active
        } else {
            ContextState::Uninitialized
        }
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        create: &mut CreateFn<'_>,
    ) -> Result<Instance> {
        self.active_store()?
            .find_or_create(descriptor.id(), descriptor, &self.scope, create)
    }

    fn find(&self, descriptor: &SystemDescriptor) -> Option<Instance> {
        self.active_store().ok()?.find(&descriptor.id())
    }

    fn destroy_one(&self, descriptor: &SystemDescriptor) -> Result<()> {
        let stores: Vec<_> = self.boundaries.lock().values().cloned().collect();
        for store in stores {
            store.destroy_one(&descriptor.id())?;
        }
        Ok(())
    }

    fn shutdown(&self) -> Vec<LocatorError> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        ambient::purge(self.id, None);
        let stores: Vec<_> = self.boundaries.lock().drain().map(|(_, s)| s).collect();
        stores
            .iter()
            .flat_map(|store| store.close(&self.scope))
            .collect()
    }

    fn is_proxiable(&self) -> bool {
        true
    }

    fn requires_boundary(&self) -> bool {
        true
    }

    fn attach(&self, locator: &Locator) -> Result<()> {
        let attached = self.locator.get_or_init(|| locator.downgrade());
        if !attached.points_to(locator) {
            return Err(LocatorError::Configuration(format!(
                "request context '{}' is already installed in another locator",
                self.scope
            )));
        }
        Ok(())
    }
}
