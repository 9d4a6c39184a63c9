use std::any::type_name;
use std::sync::Arc;

use crate::creator::Instance;
use crate::error::{LocatorError, Result};
use crate::proxy::{Proxy, ProxyHandle};

/// Outcome of a resolution: the instance itself, or a proxy to it.
#[derive(Clone, Debug)]
pub enum Service {
    Instance(Instance),
    /// Handed out when the instance's context lives elsewhere; see [`ProxyHandle`].
    Proxy(ProxyHandle),
}

impl Service {
    /// The underlying value as `T`. A proxy resolves its current instance first.
    pub fn downcast<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let (instance, contract) = match self {
            Service::Instance(instance) => (instance.clone(), "instance"),
            Service::Proxy(handle) => (handle.current()?, handle.contract()),
        };
        instance
            .downcast::<T>()
            .map_err(|_| LocatorError::TypeMismatch {
                contract: contract.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// The type-erased instance, resolving a proxy.
    pub fn instance(&self) -> Result<Instance> {
        match self {
            Service::Instance(instance) => Ok(instance.clone()),
            Service::Proxy(handle) => handle.current(),
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Service::Proxy(_))
    }

    pub fn as_proxy<T: Send + Sync + 'static>(&self) -> Option<Proxy<T>> {
        match self {
            Service::Proxy(handle) => Some(Proxy::new(handle.clone())),
            Service::Instance(_) => None,
        }
    }
}
