//! Instantiation collaborators.
//!
//! A [`Creator`] turns a descriptor's resolved injection points into an
//! instance, and releases it again when its context is destroyed. The
//! locator calls `create` exactly once per first-time construction in a
//! context; it never retries a failed creation.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::descriptor::{Injectee, InjecteePosition};
use crate::error::{BoxError, LocatorError, Result};
use crate::locator::Service;
use crate::proxy::Proxy;

/// A created component, type-erased.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Produces and disposes instances for one descriptor.
pub trait Creator: Send + Sync {
    fn create(&self, args: &Arguments) -> Result<Instance, BoxError>;

    /// Pre-destroy hook, invoked once when the owning context releases `instance`.
    fn dispose(&self, _instance: &Instance) -> Result<(), BoxError> {
        Ok(())
    }

    /// Whether instances come from a factory rather than the implementation itself.
    fn is_factory(&self) -> bool {
        false
    }
}

/// Resolved value of one injection point.
#[derive(Clone)]
pub enum InjecteeValue {
    Service(Service),
    All(Vec<Service>),
    /// Optional injection point with no match.
    Absent,
}

/// The resolved injection points handed to [`Creator::create`], in declaration order.
#[derive(Clone, Default)]
pub struct Arguments {
    values: Vec<(Injectee, InjecteeValue)>,
}

impl Arguments {
    pub fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn new(values: Vec<(Injectee, InjecteeValue)>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, index: usize) -> Result<&InjecteeValue> {
        self.values
            .get(index)
            .map(|(_, value)| value)
            .ok_or_else(|| LocatorError::State(format!("no injection point at index {}", index)))
    }

    /// Looks up a field injection point by name.
    pub fn field_value(&self, name: &str) -> Result<&InjecteeValue> {
        self.values
            .iter()
            .find(|(injectee, _)| matches!(&injectee.position, InjecteePosition::Field(f) if f == name))
            .map(|(_, value)| value)
            .ok_or_else(|| LocatorError::State(format!("no injection point for field {}", name)))
    }

    /// The service at `index`; a proxy is dereferenced to its current instance.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        self.optional(index)?
            .ok_or_else(|| LocatorError::unsatisfied(self.contract_at(index)))
    }

    pub fn field<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        match self.field_value(name)? {
            InjecteeValue::Service(service) => service.downcast(),
            _ => Err(LocatorError::TypeMismatch {
                contract: name.to_string(),
                expected: type_name::<T>(),
            }),
        }
    }

    pub fn optional<T: Send + Sync + 'static>(&self, index: usize) -> Result<Option<Arc<T>>> {
        match self.value(index)? {
            InjecteeValue::Service(service) => service.downcast().map(Some),
            InjecteeValue::Absent => Ok(None),
            InjecteeValue::All(_) => Err(LocatorError::TypeMismatch {
                contract: self.contract_at(index).to_string(),
                expected: type_name::<T>(),
            }),
        }
    }

    /// The proxy injected at `index`.
    pub fn proxy<T: Send + Sync + 'static>(&self, index: usize) -> Result<Proxy<T>> {
        match self.value(index)? {
            InjecteeValue::Service(Service::Proxy(handle)) => Ok(Proxy::new(handle.clone())),
            _ => Err(LocatorError::TypeMismatch {
                contract: self.contract_at(index).to_string(),
                expected: type_name::<Proxy<T>>(),
            }),
        }
    }

    pub fn all<T: Send + Sync + 'static>(&self, index: usize) -> Result<Vec<Arc<T>>> {
        match self.value(index)? {
            InjecteeValue::All(services) => services.iter().map(|s| s.downcast::<T>()).collect(),
            InjecteeValue::Service(service) => Ok(vec![service.downcast()?]),
            InjecteeValue::Absent => Ok(Vec::new()),
        }
    }

    fn contract_at(&self, index: usize) -> &str {
        self.values
            .get(index)
            .map(|(injectee, _)| injectee.contract())
            .unwrap_or_default()
    }
}

type CreateFn<T> = dyn Fn(&Arguments) -> Result<T, BoxError> + Send + Sync;
type DisposeFn<T> = dyn Fn(&T) -> Result<(), BoxError> + Send + Sync;

/// Closure-backed creator; see [`from_fn`].
pub struct FnCreator<T> {
    create: Box<CreateFn<T>>,
    dispose: Option<Box<DisposeFn<T>>>,
}

/// Builds a creator from a constructor closure.
pub fn from_fn<T, F>(create: F) -> FnCreator<T>
where
    T: Send + Sync + 'static,
    F: Fn(&Arguments) -> Result<T, BoxError> + Send + Sync + 'static,
{
    FnCreator {
        create: Box::new(create),
        dispose: None,
    }
}

impl<T: Send + Sync + 'static> FnCreator<T> {
    /// Registers the pre-destroy hook.
    pub fn on_dispose<D>(mut self, dispose: D) -> Self
    where
        D: Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.dispose = Some(Box::new(dispose));
        self
    }
}

impl<T: Send + Sync + 'static> Creator for FnCreator<T> {
    fn create(&self, args: &Arguments) -> Result<Instance, BoxError> {
        let value = (self.create)(args)?;
        Ok(Arc::new(value))
    }

    fn dispose(&self, instance: &Instance) -> Result<(), BoxError> {
        match (&self.dispose, instance.downcast_ref::<T>()) {
            (Some(dispose), Some(value)) => dispose(value),
            _ => Ok(()),
        }
    }
}

/// Always yields the same pre-built instance.
pub struct ConstantCreator {
    instance: Instance,
}

impl ConstantCreator {
    pub fn new<T: Send + Sync + 'static>(value: T) -> Self {
        Self {
            instance: Arc::new(value),
        }
    }
}

impl Creator for ConstantCreator {
    fn create(&self, _args: &Arguments) -> Result<Instance, BoxError> {
        Ok(self.instance.clone())
    }
}

/// A component that manufactures instances of another type.
pub trait Factory: Send + Sync + 'static {
    type Output: Send + Sync + 'static;

    fn provide(&self, args: &Arguments) -> Result<Self::Output, BoxError>;

    fn dispose(&self, _instance: &Self::Output) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Adapts a [`Factory`] into a [`Creator`].
pub struct FactoryCreator<F> {
    factory: F,
}

impl<F: Factory> FactoryCreator<F> {
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

impl<F: Factory> Creator for FactoryCreator<F> {
    fn create(&self, args: &Arguments) -> Result<Instance, BoxError> {
        Ok(Arc::new(self.factory.provide(args)?))
    }

    fn dispose(&self, instance: &Instance) -> Result<(), BoxError> {
        match instance.downcast_ref::<F::Output>() {
            Some(value) => self.factory.dispose(value),
            None => Ok(()),
        }
    }

    fn is_factory(&self) -> bool {
        true
    }
}
