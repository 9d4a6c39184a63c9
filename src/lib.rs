//! Warden - service locator with scoped contexts and cross-locator proxies
//!
//! A [`Locator`] holds a registry of [`Descriptor`]s, changed only through
//! transactional [`DynamicConfiguration`] commits, and resolves lookups to
//! instances managed by scope [`Context`]s. Components that must outlive
//! the scope of what they depend on receive [`Proxy`] handles that find the
//! current instance on every call.

pub mod config;
pub mod context;
pub mod creator;
pub mod descriptor;
pub mod dynamic;
pub mod error;
pub mod filter;
pub mod locator;
pub mod proxy;
pub mod registry;

pub use config::{AmbiguityPolicy, DuplicateNamePolicy, LocatorConfig};
pub use context::{
    BoundaryId, Context, ContextState, PerLookupContext, RequestContext, SharedContext,
    SingletonContext, PER_LOOKUP, REQUEST, SINGLETON,
};
pub use creator::{Arguments, Creator, Factory, FactoryCreator, Instance, InjecteeValue};
pub use descriptor::{
    constant, ActiveDescriptor, Descriptor, DescriptorBuilder, DescriptorId, DescriptorType,
    Injectee, InjecteePosition,
};
pub use dynamic::{ChangeListener, ChangeSet, DynamicConfiguration, ListenerId, Tracker, TrackerEvent};
pub use error::{BoxError, LocatorError, Result};
pub use filter::{Filter, IndexedFilter, Lookup};
pub use locator::{Locator, LocatorBuilder, LocatorId, Service, WeakLocator};
pub use proxy::{Proxy, ProxyHandle};
pub use registry::{Registry, SystemDescriptor};
