//! The locator: a named container owning one registry and a set of contexts.
//!
//! # Example
//!
//! ```ignore
//! use warden::{DescriptorBuilder, Locator, SINGLETON};
//! use warden::creator;
//!
//! let locator = Locator::new("app");
//!
//! let mut config = locator.configuration();
//! config.add_descriptor(
//!     DescriptorBuilder::link_type::<Database>()
//!         .in_scope(SINGLETON)
//!         .build_with(creator::from_fn(|_| Ok(Database::connect()))),
//! );
//! config.commit()?;
//!
//! let db = locator.get_service::<Database>()?;
//! locator.shutdown();
//! ```

mod resolve;
mod service;

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use ulid::Ulid;

pub use service::Service;

use crate::config::{DuplicateNamePolicy, LocatorConfig};
use crate::context::{Context, PerLookupContext, SingletonContext};
use crate::dynamic::{ChangeListener, ChangeSet, DynamicConfiguration, ListenerId, StagedOp};
use crate::error::{LocatorError, Result};
use crate::filter::{select, Filter};
use crate::registry::{Registry, Snapshot, SystemDescriptor};

/// Identity of a locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocatorId(Ulid);

impl LocatorId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for LocatorId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LocatorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct LocatorInner {
    id: LocatorId,
    name: String,
    config: LocatorConfig,
    registry: Registry,
    contexts: RwLock<Vec<Arc<dyn Context>>>,
    parents: Vec<Locator>,
    listeners: RwLock<Vec<(ListenerId, Arc<dyn ChangeListener>)>>,
    next_listener: AtomicU64,
    commit_lock: Mutex<()>,
    /// Published changes not yet delivered to listeners, in commit order.
    pending: Mutex<VecDeque<ChangeSet>>,
    /// Held while delivering; the flag marks an active drain on this thread.
    notifier: ReentrantMutex<Cell<bool>>,
    shut_down: AtomicBool,
}

/// A named DI container.
///
/// Cloning is cheap and yields another handle to the same container.
/// Locators are independent of each other unless linked as parent and
/// child or joined through a [`SharedContext`](crate::context::SharedContext).
#[derive(Clone)]
pub struct Locator {
    inner: Arc<LocatorInner>,
}

/// Non-owning locator handle held by proxies and request boundaries.
#[derive(Clone)]
pub struct WeakLocator(Weak<LocatorInner>);

impl WeakLocator {
    pub fn upgrade(&self) -> Option<Locator> {
        self.0.upgrade().map(|inner| Locator { inner })
    }

    pub(crate) fn points_to(&self, locator: &Locator) -> bool {
        std::ptr::eq(self.0.as_ptr(), Arc::as_ptr(&locator.inner))
    }
}

impl fmt::Debug for WeakLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.upgrade() {
            Some(inner) => write!(f, "WeakLocator({})", inner.name),
            None => f.write_str("WeakLocator(<dropped>)"),
        }
    }
}

/// Builder for a [`Locator`] with custom config, parents or contexts.
pub struct LocatorBuilder {
    name: String,
    config: LocatorConfig,
    parents: Vec<Locator>,
    contexts: Vec<Arc<dyn Context>>,
}

impl LocatorBuilder {
    pub fn config(mut self, config: LocatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Uses the layered configuration from files and environment.
    pub fn load_config(mut self) -> Result<Self> {
        self.config = LocatorConfig::load()?;
        Ok(self)
    }

    /// Delegates unresolved lookups to `parent`, in the order parents are added.
    pub fn parent(mut self, parent: &Locator) -> Self {
        self.parents.push(parent.clone());
        self
    }

    pub fn context(mut self, context: Arc<dyn Context>) -> Self {
        self.contexts.push(context);
        self
    }

    pub fn build(self) -> Result<Locator> {
        let locator = Locator::assemble(self.name, self.config, self.parents);
        for context in self.contexts {
            locator.add_context(context)?;
        }
        Ok(locator)
    }
}

impl Locator {
    /// Creates a locator with the default config and the built-in
    /// `singleton` and `per-lookup` contexts.
    pub fn new(name: impl Into<String>) -> Self {
        Self::assemble(name.into(), LocatorConfig::default(), Vec::new())
    }

    pub fn builder(name: impl Into<String>) -> LocatorBuilder {
        LocatorBuilder {
            name: name.into(),
            config: LocatorConfig::default(),
            parents: Vec::new(),
            contexts: Vec::new(),
        }
    }

    fn assemble(name: String, config: LocatorConfig, parents: Vec<Locator>) -> Self {
        let id = LocatorId::new();
        let contexts: Vec<Arc<dyn Context>> = vec![
            Arc::new(SingletonContext::owned_by(id)),
            Arc::new(PerLookupContext::new()),
        ];
        tracing::debug!(locator = %name, %id, parents = parents.len(), "Created locator");
        Self {
            inner: Arc::new(LocatorInner {
                id,
                name,
                config,
                registry: Registry::new(id),
                contexts: RwLock::new(contexts),
                parents,
                listeners: RwLock::new(Vec::new()),
                next_listener: AtomicU64::new(1),
                commit_lock: Mutex::new(()),
                pending: Mutex::new(VecDeque::new()),
                notifier: ReentrantMutex::new(Cell::new(false)),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> LocatorId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &LocatorConfig {
        &self.inner.config
    }

    pub fn parents(&self) -> &[Locator] {
        &self.inner.parents
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn downgrade(&self) -> WeakLocator {
        WeakLocator(Arc::downgrade(&self.inner))
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }

    // ========================================================================
    // Contexts
    // ========================================================================

    /// Installs `context` for its scope.
    ///
    /// Fails with `Configuration` if a context for the scope is already
    /// installed or the context refuses this locator.
    pub fn add_context(&self, context: Arc<dyn Context>) -> Result<()> {
        self.ensure_running()?;
        let mut contexts = self.inner.contexts.write();
        if contexts.iter().any(|c| c.scope() == context.scope()) {
            return Err(LocatorError::Configuration(format!(
                "locator '{}' already has a context for scope '{}'",
                self.name(),
                context.scope()
            )));
        }
        context.attach(self)?;
        tracing::debug!(locator = %self.name(), scope = context.scope(), "Installed context");
        contexts.push(context);
        Ok(())
    }

    /// The context installed for `scope`.
    pub fn context(&self, scope: &str) -> Option<Arc<dyn Context>> {
        self.inner
            .contexts
            .read()
            .iter()
            .find(|c| c.scope() == scope)
            .cloned()
    }

    pub(crate) fn context_for(&self, scope: &str) -> Result<Arc<dyn Context>> {
        self.context(scope).ok_or_else(|| {
            LocatorError::State(format!(
                "locator '{}' has no context for scope '{}'",
                self.name(),
                scope
            ))
        })
    }

    // ========================================================================
    // Dynamic configuration
    // ========================================================================

    /// Opens a configuration session.
    pub fn configuration(&self) -> DynamicConfiguration {
        DynamicConfiguration::new(self.clone())
    }

    /// Applies a staged session, then notifies listeners.
    ///
    /// Listeners run outside the commit lock, so a listener may commit to
    /// this locator. Such a nested commit is published immediately and
    /// delivered after the current notification round, keeping commit order.
    pub(crate) fn commit(&self, ops: Vec<StagedOp>) -> Result<ChangeSet> {
        let change = self.apply(ops)?;
        self.notify_listeners();
        Ok(change)
    }

    fn apply(&self, ops: Vec<StagedOp>) -> Result<ChangeSet> {
        let _guard = self.inner.commit_lock.lock();
        self.ensure_running()?;

        let registry = self.registry();
        registry.begin()?;
        if let Err(err) = self.stage(ops) {
            registry.abort();
            tracing::warn!(locator = %self.name(), error = %err, "Rejected dynamic configuration");
            return Err(err);
        }
        let change = registry.publish()?;

        for descriptor in &change.removed {
            if let Some(context) = self.context(descriptor.scope()) {
                if let Err(err) = context.destroy_one(descriptor) {
                    tracing::warn!(
                        descriptor = %descriptor,
                        error = %err,
                        "Failed to release instance of removed descriptor"
                    );
                }
            }
        }

        tracing::info!(
            locator = %self.name(),
            added = change.added.len(),
            removed = change.removed.len(),
            "Committed dynamic configuration"
        );

        self.inner.pending.lock().push_back(change.clone());
        Ok(change)
    }

    fn notify_listeners(&self) {
        let notifier = self.inner.notifier.lock();
        if notifier.replace(true) {
            // Re-entered from a listener; the outer drain delivers it.
            return;
        }
        let _draining = DrainGuard(&*notifier);

        loop {
            let Some(change) = self.inner.pending.lock().pop_front() else {
                break;
            };
            let listeners: Vec<_> = self
                .inner
                .listeners
                .read()
                .iter()
                .map(|(_, listener)| listener.clone())
                .collect();
            for listener in listeners {
                listener.configuration_changed(&change);
            }
        }
    }

    fn stage(&self, ops: Vec<StagedOp>) -> Result<()> {
        let registry = self.registry();
        for op in ops {
            match op {
                StagedOp::Add(id, active) => {
                    if self.context(&active.descriptor.scope).is_none() {
                        return Err(LocatorError::Configuration(format!(
                            "no context for scope '{}' of {}",
                            active.descriptor.scope, active.descriptor.implementation
                        )));
                    }
                    registry.add_with_id(id, active)?;
                }
                StagedOp::Remove(filter) => {
                    registry.remove_all(filter.as_ref())?;
                }
            }
        }

        if self.config().duplicate_names == DuplicateNamePolicy::RejectWithinScope {
            registry.inspect_staged(check_duplicate_names)??;
        }
        Ok(())
    }

    /// Adds a listener notified after every successful commit.
    pub fn register_listener(&self, listener: impl ChangeListener + 'static) -> ListenerId {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        self.inner
            .listeners
            .write()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener; returns whether it was registered.
    pub fn unregister_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Descriptors registered in this locator matching `filter`, in rank order.
    pub fn get_descriptors(&self, filter: &dyn Filter) -> Vec<Arc<SystemDescriptor>> {
        select(self.registry(), filter)
    }

    /// The first descriptor `get_descriptors` would return.
    pub fn get_best_descriptor(&self, filter: &dyn Filter) -> Option<Arc<SystemDescriptor>> {
        self.get_descriptors(filter).into_iter().next()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Shuts the locator down, destroying the contexts it owns in reverse
    /// installation order.
    ///
    /// Returns the pre-destroy failures collected along the way. Shared
    /// contexts owned by another locator are left alone. Later calls return
    /// nothing.
    pub fn shutdown(&self) -> Vec<LocatorError> {
        let _guard = self.inner.commit_lock.lock();
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        let contexts: Vec<_> = self.inner.contexts.read().clone();
        let mut errors = Vec::new();
        for context in contexts.iter().rev() {
            match context.owner() {
                Some(owner) if owner != self.id() => {
                    tracing::debug!(scope = context.scope(), "Skipping context owned by another locator");
                }
                _ => errors.extend(context.shutdown()),
            }
        }
        self.inner.listeners.write().clear();

        tracing::info!(locator = %self.name(), failures = errors.len(), "Locator shut down");
        errors
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(LocatorError::State(format!(
                "locator '{}' has been shut down",
                self.name()
            )));
        }
        Ok(())
    }
}

struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

fn check_duplicate_names(working: &Snapshot, added: &[Arc<SystemDescriptor>]) -> Result<()> {
    for descriptor in added {
        let Some(name) = descriptor.descriptor().name.as_deref() else {
            continue;
        };
        let clash = working.by_name(name).find(|other| {
            other.id() != descriptor.id()
                && other.scope() == descriptor.scope()
                && descriptor
                    .descriptor()
                    .advertised_contracts()
                    .iter()
                    .any(|c| other.descriptor().advertises(c))
        });
        if let Some(other) = clash {
            return Err(LocatorError::Configuration(format!(
                "name '{}' is already used by {} in scope '{}'",
                name,
                other.implementation(),
                descriptor.scope()
            )));
        }
    }
    Ok(())
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Locator")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("descriptors", &self.registry().len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
