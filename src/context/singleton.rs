//! Locator-lifetime scope.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::store::InstanceStore;
use super::{Context, ContextState, CreateFn, SINGLETON};
use crate::creator::Instance;
use crate::descriptor::DescriptorId;
use crate::error::{LocatorError, Result};
use crate::locator::{Locator, LocatorId};
use crate::registry::SystemDescriptor;

/// One instance per descriptor until the owning locator shuts down.
///
/// Concurrent first lookups of the same descriptor construct it once; the
/// other callers wait and receive that instance. Once destroyed the context
/// stays destroyed.
pub struct SingletonContext {
    scope: String,
    owner: OnceCell<LocatorId>,
    store: InstanceStore<DescriptorId>,
}

impl SingletonContext {
    pub fn new() -> Self {
        Self::with_scope(SINGLETON)
    }

    /// A singleton-like context for a custom scope name.
    pub fn with_scope(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            owner: OnceCell::new(),
            store: InstanceStore::new(),
        }
    }

    pub(crate) fn owned_by(owner: LocatorId) -> Self {
        let context = Self::new();
        let _ = context.owner.set(owner);
        context
    }
}

impl Default for SingletonContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Context for SingletonContext {
    fn scope(&self) -> &str {
        &self.scope
    }

    fn state(&self) -> ContextState {
        self.store.state()
    }

    fn find_or_create(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        create: &mut CreateFn<'_>,
    ) -> Result<Instance> {
        self.store
            .find_or_create(descriptor.id(), descriptor, &self.scope, create)
    }

    fn find(&self, descriptor: &SystemDescriptor) -> Option<Instance> {
        self.store.find(&descriptor.id())
    }

    fn destroy_one(&self, descriptor: &SystemDescriptor) -> Result<()> {
        self.store.destroy_one(&descriptor.id())
    }

    fn shutdown(&self) -> Vec<LocatorError> {
        self.store.close(&self.scope)
    }

    fn owner(&self) -> Option<LocatorId> {
        self.owner.get().copied()
    }

    fn attach(&self, locator: &Locator) -> Result<()> {
        let owner = *self.owner.get_or_init(|| locator.id());
        if owner != locator.id() {
            return Err(LocatorError::Configuration(format!(
                "scope '{}' already belongs to another locator",
                self.scope
            )));
        }
        Ok(())
    }
}
