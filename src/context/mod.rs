//! Scope contexts.
//!
//! A [`Context`] owns the instances of one scope within a locator. The
//! locator asks the context named by a descriptor's scope for an instance;
//! the context either returns the one it already holds for the active
//! scope instance or runs the supplied construction callback once and keeps
//! the result.
//!
//! Built-in contexts:
//!
//! - [`SingletonContext`]: one instance per descriptor for the locator's lifetime
//! - [`PerLookupContext`]: a new instance on every lookup, nothing retained
//! - [`RequestContext`]: one instance per descriptor per request boundary
//! - [`SharedContext`]: one instance per implementation, installable into
//!   several locators at once

pub(crate) mod ambient;
mod per_lookup;
mod request;
mod shared;
mod singleton;
mod store;

use std::fmt;
use std::sync::Arc;

pub use per_lookup::PerLookupContext;
pub use request::{BoundaryId, RequestContext};
pub use shared::SharedContext;
pub use singleton::SingletonContext;

use crate::creator::Instance;
use crate::error::{LocatorError, Result};
use crate::locator::{Locator, LocatorId};
use crate::registry::SystemDescriptor;

pub const SINGLETON: &str = "singleton";
pub const PER_LOOKUP: &str = "per-lookup";
pub const REQUEST: &str = "request";

/// Construction callback handed to [`Context::find_or_create`].
pub type CreateFn<'a> = dyn FnMut() -> Result<Instance> + 'a;

/// Lifecycle of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Uninitialized,
    Active,
    /// Terminal.
    Destroyed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextState::Uninitialized => "uninitialized",
            ContextState::Active => "active",
            ContextState::Destroyed => "destroyed",
        };
        f.write_str(s)
    }
}

/// Scope lifecycle manager.
pub trait Context: Send + Sync {
    /// Scope name descriptors refer to.
    fn scope(&self) -> &str;

    fn state(&self) -> ContextState;

    /// Returns the instance held for `descriptor`, creating it with `create` if absent.
    ///
    /// Never returns two different instances for one descriptor within the
    /// same active scope instance.
    fn find_or_create(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        create: &mut CreateFn<'_>,
    ) -> Result<Instance>;

    /// The instance currently held for `descriptor`, without creating one.
    fn find(&self, descriptor: &SystemDescriptor) -> Option<Instance>;

    fn contains(&self, descriptor: &SystemDescriptor) -> bool {
        self.find(descriptor).is_some()
    }

    /// Releases the instance held for `descriptor`, running its pre-destroy hook.
    fn destroy_one(&self, descriptor: &SystemDescriptor) -> Result<()>;

    /// Transitions to `Destroyed`, releasing everything held.
    ///
    /// Pre-destroy failures are collected and returned; the remaining
    /// instances are still released. Calling it again is a no-op.
    fn shutdown(&self) -> Vec<LocatorError>;

    /// Instances must be injected as proxies into components of other scopes.
    fn is_proxiable(&self) -> bool {
        false
    }

    /// Lookups need an active boundary on the calling thread.
    fn requires_boundary(&self) -> bool {
        false
    }

    /// The context may be installed into more than one locator.
    fn is_shared(&self) -> bool {
        false
    }

    /// Locator responsible for shutting this context down.
    fn owner(&self) -> Option<LocatorId> {
        None
    }

    /// Called when the context is installed into `locator`.
    fn attach(&self, _locator: &Locator) -> Result<()> {
        Ok(())
    }
}

impl fmt::Debug for dyn Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("scope", &self.scope())
            .field("state", &self.state())
            .finish()
    }
}
