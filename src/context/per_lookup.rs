//! Scope that never caches.

use std::sync::Arc;

use super::{Context, ContextState, CreateFn, PER_LOOKUP};
use crate::creator::Instance;
use crate::error::{LocatorError, Result};
use crate::registry::SystemDescriptor;

/// Creates a fresh instance on every lookup and retains nothing.
#[derive(Debug, Default)]
pub struct PerLookupContext;

impl PerLookupContext {
    pub fn new() -> Self {
        Self
    }
}

impl Context for PerLookupContext {
    fn scope(&self) -> &str {
        PER_LOOKUP
    }

    fn state(&self) -> ContextState {
        ContextState::Active
    }

    fn find_or_create(
        &self,
        _descriptor: &Arc<SystemDescriptor>,
        create: &mut CreateFn<'_>,
    ) -> Result<Instance> {
        create()
    }

    fn find(&self, _descriptor: &SystemDescriptor) -> Option<Instance> {
        None
    }

    fn destroy_one(&self, _descriptor: &SystemDescriptor) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self) -> Vec<LocatorError> {
        Vec::new()
    }
}
