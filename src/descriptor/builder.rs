//! Fluent construction of descriptors.
//!
//! ```ignore
//! let active = DescriptorBuilder::link("app::PgStore")
//!     .to("app::Store")
//!     .named("primary")
//!     .in_scope(SINGLETON)
//!     .ranked(10)
//!     .inject(Injectee::parameter(0, "app::Pool"))
//!     .build_with(creator::from_fn(|args| Ok(PgStore::new(args.get(0)?))));
//! ```

use std::any::type_name;
use std::sync::Arc;

use super::{ActiveDescriptor, Descriptor, DescriptorType, Injectee};
use crate::context::SINGLETON;
use crate::creator::{ConstantCreator, Creator};

/// Builds a [`Descriptor`] or an [`ActiveDescriptor`].
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    descriptor: Descriptor,
    injectees: Vec<Injectee>,
}

impl DescriptorBuilder {
    /// Starts a descriptor for `implementation`, advertising it as a contract.
    pub fn link(implementation: impl Into<String>) -> Self {
        let implementation = implementation.into();
        let mut descriptor = Descriptor::new(implementation.clone());
        descriptor.contracts.insert(implementation);
        Self {
            descriptor,
            injectees: Vec::new(),
        }
    }

    /// Starts a descriptor whose implementation is not itself a contract.
    pub fn link_unadvertised(implementation: impl Into<String>) -> Self {
        Self {
            descriptor: Descriptor::new(implementation),
            injectees: Vec::new(),
        }
    }

    pub fn link_type<T: ?Sized + 'static>() -> Self {
        Self::link(type_name::<T>())
    }

    pub fn to(mut self, contract: impl Into<String>) -> Self {
        self.descriptor.contracts.insert(contract.into());
        self
    }

    pub fn to_type<T: ?Sized + 'static>(self) -> Self {
        self.to(type_name::<T>())
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.descriptor.name = Some(name.into());
        self
    }

    pub fn in_scope(mut self, scope: impl Into<String>) -> Self {
        self.descriptor.scope = scope.into();
        self
    }

    pub fn qualified_by(mut self, qualifier: impl Into<String>) -> Self {
        self.descriptor.qualifiers.insert(qualifier.into());
        self
    }

    pub fn ranked(mut self, rank: i32) -> Self {
        self.descriptor.rank = rank;
        self
    }

    /// Appends `value` to the metadata sequence under `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.descriptor
            .metadata
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    pub fn of_type(mut self, descriptor_type: DescriptorType) -> Self {
        self.descriptor.descriptor_type = descriptor_type;
        self
    }

    /// Adds an injection point owned by this implementation.
    pub fn inject(mut self, mut injectee: Injectee) -> Self {
        injectee.owner = Some(self.descriptor.implementation.clone());
        self.injectees.push(injectee);
        self
    }

    pub fn build(self) -> Descriptor {
        self.descriptor
    }

    pub fn build_with(self, creator: impl Creator + 'static) -> ActiveDescriptor {
        self.build_with_arc(Arc::new(creator))
    }

    pub fn build_with_arc(self, creator: Arc<dyn Creator>) -> ActiveDescriptor {
        let mut descriptor = self.descriptor;
        if creator.is_factory() {
            descriptor.descriptor_type = DescriptorType::Factory;
        }
        ActiveDescriptor {
            descriptor,
            injectees: self.injectees,
            creator,
        }
    }
}

/// A singleton descriptor that always yields `value`, advertised under its type name.
pub fn constant<T: Send + Sync + 'static>(value: T) -> ActiveDescriptor {
    DescriptorBuilder::link_type::<T>()
        .in_scope(SINGLETON)
        .build_with(ConstantCreator::new(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{PER_LOOKUP, REQUEST};
    use crate::creator::{self, FactoryCreator};

    struct Pool;

    #[test]
    fn test_link_advertises_implementation() {
        let descriptor = DescriptorBuilder::link("app::PgStore").to("app::Store").build();
        assert!(descriptor.contracts.contains("app::PgStore"));
        assert!(descriptor.contracts.contains("app::Store"));
        assert_eq!(descriptor.scope, PER_LOOKUP);
    }

    #[test]
    fn test_link_unadvertised() {
        let descriptor = DescriptorBuilder::link_unadvertised("app::PgStore")
            .to("app::Store")
            .build();
        assert!(!descriptor.contracts.contains("app::PgStore"));
        assert!(descriptor.advertises("app::Store"));
    }

    #[test]
    fn test_metadata_accumulates_in_order() {
        let descriptor = DescriptorBuilder::link("app::Handler")
            .with_metadata("route", "/a")
            .with_metadata("route", "/b")
            .build();
        assert_eq!(descriptor.metadata["route"], vec!["/a", "/b"]);
    }

    #[test]
    fn test_inject_sets_owner() {
        let active = DescriptorBuilder::link("app::Repo")
            .in_scope(REQUEST)
            .inject(Injectee::parameter(0, "app::Pool"))
            .build_with(creator::from_fn(|_| Ok(Pool)));
        assert_eq!(active.injectees[0].owner.as_deref(), Some("app::Repo"));
        assert_eq!(active.descriptor.descriptor_type, DescriptorType::Class);
    }

    #[test]
    fn test_factory_creator_marks_factory_type() {
        struct PoolFactory;
        impl crate::creator::Factory for PoolFactory {
            type Output = Pool;
            fn provide(
                &self,
                _args: &crate::creator::Arguments,
            ) -> Result<Pool, crate::error::BoxError> {
                Ok(Pool)
            }
        }

        let active = DescriptorBuilder::link_type::<Pool>().build_with(FactoryCreator::new(PoolFactory));
        assert_eq!(active.descriptor.descriptor_type, DescriptorType::Factory);
    }

    #[test]
    fn test_constant_is_singleton_under_type_name() {
        let active = constant(42u32);
        assert_eq!(active.descriptor.scope, SINGLETON);
        assert!(active.descriptor.advertises(type_name::<u32>()));
    }
}
