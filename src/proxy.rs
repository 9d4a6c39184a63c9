//! Call-time indirection to instances owned by another scope or locator.
//!
//! A [`ProxyHandle`] never holds the instance it stands for. Every access
//! asks the calling thread's ambient boundary table which locator is
//! current for the target scope and resolves the instance there, falling
//! back to the locator that issued the proxy when no boundary of that scope
//! is active. One proxy injected into a long-lived component therefore
//! reaches a different instance in each request.
//!
//! # Example
//!
//! ```ignore
//! struct Greeter {
//!     request: Proxy<RequestData>,
//! }
//!
//! impl Greeter {
//!     fn greet(&self) -> warden::Result<String> {
//!         self.request.with(|data| format!("hello {}", data.user()))
//!     }
//! }
//! ```
//!
//! A component shared between locators keeps the physical identity of the
//! instance it was built with; only what it reaches through its proxies
//! follows the caller. State a shared component copies out of a proxy into
//! its own fields is visible to every locator.

use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::context::ambient;
use crate::creator::Instance;
use crate::error::{LocatorError, Result};
use crate::filter::Lookup;
use crate::locator::WeakLocator;

/// Untyped proxy: the lookup, target implementation and scope to resolve at call time.
#[derive(Clone, Debug)]
pub struct ProxyHandle {
    lookup: Lookup,
    implementation: String,
    scope: String,
    origin: WeakLocator,
}

impl ProxyHandle {
    pub(crate) fn new(
        lookup: Lookup,
        implementation: impl Into<String>,
        scope: impl Into<String>,
        origin: WeakLocator,
    ) -> Self {
        Self {
            lookup,
            implementation: implementation.into(),
            scope: scope.into(),
            origin,
        }
    }

    pub fn contract(&self) -> &str {
        &self.lookup.contract
    }

    pub fn lookup(&self) -> &Lookup {
        &self.lookup
    }

    pub fn implementation(&self) -> &str {
        &self.implementation
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Resolves the instance current for the calling thread.
    ///
    /// Fails with `NoActiveContext` when the target scope needs a boundary
    /// and none is active.
    pub fn current(&self) -> Result<Instance> {
        let locator = match ambient::current(&self.scope) {
            Some(activation) => activation
                .locator
                .upgrade()
                .ok_or_else(|| LocatorError::ContextDestroyed(self.scope.clone()))?,
            None => {
                let origin = self.origin.upgrade().ok_or_else(|| {
                    LocatorError::State(format!(
                        "locator behind proxy for {} has been dropped",
                        self.lookup
                    ))
                })?;
                if origin
                    .context(&self.scope)
                    .map_or(false, |context| context.requires_boundary())
                {
                    return Err(LocatorError::NoActiveContext(self.scope.clone()));
                }
                origin
            }
        };
        locator.resolve_current(&self.lookup, &self.implementation)
    }
}

impl PartialEq for ProxyHandle {
    fn eq(&self, other: &Self) -> bool {
        self.lookup == other.lookup
            && self.implementation == other.implementation
            && self.scope == other.scope
    }
}

impl Eq for ProxyHandle {}

/// Typed view over a [`ProxyHandle`].
pub struct Proxy<T> {
    handle: ProxyHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> Proxy<T> {
    pub fn new(handle: ProxyHandle) -> Self {
        Self {
            handle,
            _marker: PhantomData,
        }
    }

    /// The instance current for the calling thread.
    pub fn get(&self) -> Result<Arc<T>> {
        self.handle
            .current()?
            .downcast::<T>()
            .map_err(|_| LocatorError::TypeMismatch {
                contract: self.handle.contract().to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Runs `f` against the current instance.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R> {
        let instance = self.get()?;
        Ok(f(&instance))
    }

    pub fn handle(&self) -> &ProxyHandle {
        &self.handle
    }
}

impl<T> Clone for Proxy<T> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Proxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("contract", &self.handle.contract())
            .field("implementation", &self.handle.implementation())
            .field("scope", &self.handle.scope())
            .finish()
    }
}
