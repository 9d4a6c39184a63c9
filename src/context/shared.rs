//! Scope shared between locators.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::store::InstanceStore;
use super::{Context, ContextState, CreateFn};
use crate::creator::Instance;
use crate::error::{LocatorError, Result};
use crate::locator::{Locator, LocatorId};
use crate::registry::SystemDescriptor;

/// A global component manager installable into several locators.
///
/// Instances are keyed by implementation name rather than descriptor
/// identity, so every locator that registers the same implementation in
/// this scope reaches the one physical instance. The first locator the
/// context is installed into owns it: lookups from any other locator are
/// handed a proxy, and only the owner's shutdown destroys the instances.
pub struct SharedContext {
    scope: String,
    owner: OnceCell<LocatorId>,
    store: InstanceStore<String>,
}

impl SharedContext {
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            owner: OnceCell::new(),
            store: InstanceStore::new(),
        }
    }
}

impl Context for SharedContext {
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
        self.store.find_or_create(
            descriptor.implementation().to_string(),
            descriptor,
            &self.scope,
            create,
        )
    }

    fn find(&self, descriptor: &SystemDescriptor) -> Option<Instance> {
        self.store.find(&descriptor.implementation().to_string())
    }

    fn destroy_one(&self, descriptor: &SystemDescriptor) -> Result<()> {
        // Only the owner's registrations release the shared instance.
        if Some(descriptor.locator()) != self.owner() {
            return Ok(());
        }
        self.store
            .destroy_one(&descriptor.implementation().to_string())
    }

    fn shutdown(&self) -> Vec<LocatorError> {
        self.store.close(&self.scope)
    }

    fn is_shared(&self) -> bool {
        true
    }

    fn owner(&self) -> Option<LocatorId> {
        self.owner.get().copied()
    }

    fn attach(&self, locator: &Locator) -> Result<()> {
        let owner = self.owner.get_or_init(|| locator.id());
        tracing::debug!(
            scope = %self.scope,
            locator = locator.name(),
            owner = *owner == locator.id(),
            "Installed shared context"
        );
        Ok(())
    }
}
