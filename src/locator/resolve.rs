//! Resolution: lookup to instance.
//!
//! A lookup is matched against the locator's registry (then its parents),
//! the best candidate is chosen by rank and registration order, its
//! injection points are resolved recursively, and the context named by its
//! scope supplies or constructs the instance. Injection points whose target
//! lives in a proxiable scope, or in a shared context owned by another
//! locator, receive a [`ProxyHandle`] instead of an instance.

use std::cell::RefCell;
use std::sync::Arc;

use super::{Locator, Service};
use crate::config::AmbiguityPolicy;
use crate::context::Context;
use crate::creator::{Arguments, Instance, InjecteeValue};
use crate::descriptor::{DescriptorId, Injectee};
use crate::error::{BoxError, LocatorError, Result};
use crate::filter::Lookup;
use crate::proxy::ProxyHandle;
use crate::registry::SystemDescriptor;

thread_local! {
    static IN_PROGRESS: RefCell<Vec<(DescriptorId, String)>> = RefCell::new(Vec::new());
}

/// Marks a descriptor as under construction on the current thread.
///
/// The per-thread stack is the second implicit context next to the ambient
/// boundary table. It spans every entry into resolution on the thread,
/// including proxy calls made from inside a creator, so a cycle closed
/// through a proxy fails instead of waiting on its own cell. Dropping the
/// marker pops the entry.
pub(crate) struct Constructing(());

impl Constructing {
    pub(crate) fn enter(descriptor: &SystemDescriptor) -> Result<Self> {
        IN_PROGRESS.with(|entries| {
            let mut entries = entries.borrow_mut();
            if let Some(start) = entries.iter().position(|(id, _)| *id == descriptor.id()) {
                let mut path: Vec<String> = entries[start..]
                    .iter()
                    .map(|(_, implementation)| implementation.clone())
                    .collect();
                path.push(descriptor.implementation().to_string());
                return Err(LocatorError::CircularDependency { path });
            }
            entries.push((descriptor.id(), descriptor.implementation().to_string()));
            Ok(Constructing(()))
        })
    }
}

impl Drop for Constructing {
    fn drop(&mut self) {
        IN_PROGRESS.with(|entries| {
            entries.borrow_mut().pop();
        });
    }
}

/// A candidate together with the locator that registered it.
type Found = (Locator, Arc<SystemDescriptor>);

impl Locator {
    /// Resolves the best match for `lookup`.
    ///
    /// Fails with `UnsatisfiedDependency` when nothing matches here or in
    /// the parents.
    pub fn resolve(&self, lookup: &Lookup) -> Result<Service> {
        self.resolve_optional(lookup)?
            .ok_or_else(|| LocatorError::unsatisfied(&lookup.to_string()))
    }

    /// Resolves the best match for `lookup`, or `None` when nothing matches.
    pub fn resolve_optional(&self, lookup: &Lookup) -> Result<Option<Service>> {
        self.ensure_running()?;
        let Some(found) = self.find_best(lookup)? else {
            tracing::debug!(locator = %self.name(), %lookup, "No service found");
            return Ok(None);
        };
        self.service_for(None, found, lookup).map(Some)
    }

    /// Resolves every match for `lookup`: local ones in rank order, then the parents'.
    pub fn resolve_all(&self, lookup: &Lookup) -> Result<Vec<Service>> {
        self.ensure_running()?;
        self.find_all(lookup)
            .into_iter()
            .map(|found| self.service_for(None, found, lookup))
            .collect()
    }

    /// Resolves a registered descriptor directly, bypassing the query.
    pub fn resolve_descriptor(&self, descriptor: &Arc<SystemDescriptor>) -> Result<Service> {
        self.ensure_running()?;
        let owner = self.owner_of(descriptor).ok_or_else(|| {
            LocatorError::State(format!(
                "{} is not registered in locator '{}' or its parents",
                descriptor,
                self.name()
            ))
        })?;
        let lookup = Lookup::contract(descriptor.implementation());
        self.service_for(None, (owner, descriptor.clone()), &lookup)
    }

    /// The service advertised under `T`'s type name.
    pub fn get_service<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        self.resolve(&Lookup::of_type::<T>())?.downcast()
    }

    pub fn get_named_service<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        self.resolve(&Lookup::of_type::<T>().named(name))?.downcast()
    }

    pub fn get_all_services<T: Send + Sync + 'static>(&self) -> Result<Vec<Arc<T>>> {
        self.resolve_all(&Lookup::of_type::<T>())?
            .iter()
            .map(|service| service.downcast::<T>())
            .collect()
    }

    /// Resolves the instance a proxy stands for, preferring the implementation it was issued for.
    pub(crate) fn resolve_current(&self, lookup: &Lookup, implementation: &str) -> Result<Instance> {
        self.ensure_running()?;
        let local = self
            .get_descriptors(lookup)
            .into_iter()
            .find(|d| d.implementation() == implementation)
            .map(|d| (self.clone(), d));
        let found = match local {
            Some(found) => found,
            None => self
                .find_best(lookup)?
                .ok_or_else(|| LocatorError::unsatisfied(&lookup.to_string()))?,
        };
        let (owner, descriptor) = found;
        let context = owner.context_for(descriptor.scope())?;
        owner.create(&descriptor, &context)
    }

    // ========================================================================
    // Selection
    // ========================================================================

    fn find_best(&self, lookup: &Lookup) -> Result<Option<Found>> {
        if let Some(descriptor) = self.choose(lookup, self.get_descriptors(lookup))? {
            return Ok(Some((self.clone(), descriptor)));
        }
        if self.config().delegate_to_parent {
            for parent in self.parents() {
                if let Some(found) = parent.find_best(lookup)? {
                    return Ok(Some(found));
                }
            }
        }
        Ok(None)
    }

    fn find_all(&self, lookup: &Lookup) -> Vec<Found> {
        let mut found: Vec<Found> = self
            .get_descriptors(lookup)
            .into_iter()
            .map(|d| (self.clone(), d))
            .collect();
        if self.config().delegate_to_parent {
            for parent in self.parents() {
                found.extend(parent.find_all(lookup));
            }
        }
        found
    }

    fn choose(
        &self,
        lookup: &Lookup,
        candidates: Vec<Arc<SystemDescriptor>>,
    ) -> Result<Option<Arc<SystemDescriptor>>> {
        let mut candidates = candidates.into_iter();
        let Some(first) = candidates.next() else {
            return Ok(None);
        };
        if self.config().ambiguity == AmbiguityPolicy::Error {
            if let Some(second) = candidates.next() {
                if second.rank() == first.rank() {
                    return Err(LocatorError::AmbiguousConstruction {
                        contract: lookup.to_string(),
                        first: first.implementation().to_string(),
                        second: second.implementation().to_string(),
                        rank: first.rank(),
                    });
                }
            }
        }
        Ok(Some(first))
    }

    fn owner_of(&self, descriptor: &SystemDescriptor) -> Option<Locator> {
        if descriptor.locator() == self.id() {
            return self
                .registry()
                .get(descriptor.id())
                .map(|_| self.clone());
        }
        self.parents()
            .iter()
            .find_map(|parent| parent.owner_of(descriptor))
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Produces the service `found` stands for, as seen from this locator.
    ///
    /// `into_scope` is the scope of the component being injected, or `None`
    /// for a top-level lookup.
    fn service_for(
        &self,
        into_scope: Option<&str>,
        found: Found,
        lookup: &Lookup,
    ) -> Result<Service> {
        let (owner, descriptor) = found;
        let context = owner.context_for(descriptor.scope())?;

        if self.needs_proxy(into_scope, &descriptor, context.as_ref()) {
            tracing::debug!(
                locator = %self.name(),
                implementation = descriptor.implementation(),
                scope = descriptor.scope(),
                "Issuing proxy"
            );
            return Ok(Service::Proxy(ProxyHandle::new(
                lookup.clone(),
                descriptor.implementation(),
                descriptor.scope(),
                owner.downgrade(),
            )));
        }

        owner
            .create(&descriptor, &context)
            .map(Service::Instance)
    }

    fn needs_proxy(
        &self,
        into_scope: Option<&str>,
        descriptor: &SystemDescriptor,
        context: &dyn Context,
    ) -> bool {
        if context.is_shared() && context.owner() != Some(self.id()) {
            return true;
        }
        match into_scope {
            Some(scope) => {
                context.is_proxiable()
                    && (scope != descriptor.scope() || self.config().proxy_same_scope)
            }
            None => false,
        }
    }

    fn create(
        &self,
        descriptor: &Arc<SystemDescriptor>,
        context: &Arc<dyn Context>,
    ) -> Result<Instance> {
        let _constructing = Constructing::enter(descriptor)?;
        context.find_or_create(descriptor, &mut || {
            let args = self.resolve_injectees(descriptor)?;
            descriptor
                .creator()
                .create(&args)
                .map_err(|source| creation_error(descriptor, source))
        })
    }

    fn resolve_injectees(&self, descriptor: &SystemDescriptor) -> Result<Arguments> {
        let mut values = Vec::with_capacity(descriptor.injectees().len());
        for injectee in descriptor.injectees() {
            let value = self.resolve_injectee(descriptor, injectee)?;
            values.push((injectee.clone(), value));
        }
        Ok(Arguments::new(values))
    }

    fn resolve_injectee(
        &self,
        owner: &SystemDescriptor,
        injectee: &Injectee,
    ) -> Result<InjecteeValue> {
        let lookup = &injectee.lookup;
        let into_scope = Some(owner.scope());

        if injectee.multiple {
            let found = self.find_all(lookup);
            if found.is_empty() && !injectee.optional {
                return Err(unsatisfied_for(owner, injectee));
            }
            let services = found
                .into_iter()
                .map(|f| self.service_for(into_scope, f, lookup))
                .collect::<Result<Vec<_>>>()?;
            return Ok(InjecteeValue::All(services));
        }

        match self.find_best(lookup)? {
            Some(found) => self
                .service_for(into_scope, found, lookup)
                .map(InjecteeValue::Service),
            None if injectee.optional => Ok(InjecteeValue::Absent),
            None => Err(unsatisfied_for(owner, injectee)),
        }
    }
}

/// Wraps a creator failure, letting a cycle detected inside the creator
/// (through a proxy call) surface as itself.
fn creation_error(descriptor: &SystemDescriptor, source: BoxError) -> LocatorError {
    let implementation = descriptor.implementation().to_string();
    match source.downcast::<LocatorError>() {
        Ok(err) if matches!(*err, LocatorError::CircularDependency { .. }) => *err,
        Ok(err) => LocatorError::Instantiation {
            implementation,
            source: err,
        },
        Err(source) => LocatorError::Instantiation {
            implementation,
            source,
        },
    }
}

fn unsatisfied_for(owner: &SystemDescriptor, injectee: &Injectee) -> LocatorError {
    LocatorError::UnsatisfiedDependency {
        contract: injectee.lookup.to_string(),
        required_by: injectee
            .describe_owner()
            .or_else(|| Some(owner.implementation().to_string())),
    }
}
