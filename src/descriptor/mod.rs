//! Service descriptors: the metadata records a locator resolves against.
//!
//! A [`Descriptor`] names an implementation, the contracts it advertises,
//! its scope, qualifiers, optional name, rank and free-form metadata.
//! Descriptors are produced by an external metadata collaborator (or by
//! hand through [`DescriptorBuilder`]); the locator treats them as
//! immutable inputs. An [`ActiveDescriptor`] pairs a descriptor with the
//! injection points it needs and the [`Creator`] that instantiates it.

mod builder;
mod injectee;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

pub use builder::{constant, DescriptorBuilder};
pub use injectee::{Injectee, InjecteePosition};

use crate::context::PER_LOOKUP;
use crate::creator::Creator;
use crate::error::{LocatorError, Result};
use crate::locator::LocatorId;

/// How instances of a descriptor are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DescriptorType {
    /// Constructed directly from the implementation.
    #[default]
    Class,
    /// Produced by a factory's `provide` method.
    Factory,
}

/// Identity of a registered descriptor.
///
/// `seq` is the insertion sequence within the owning locator and serves as
/// the registration-order tie-break when ranks are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorId {
    pub locator: LocatorId,
    pub seq: u64,
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.locator, self.seq)
    }
}

/// Metadata describing an injectable component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub implementation: String,
    pub contracts: BTreeSet<String>,
    pub scope: String,
    pub qualifiers: BTreeSet<String>,
    pub name: Option<String>,
    pub rank: i32,
    pub metadata: BTreeMap<String, Vec<String>>,
    pub descriptor_type: DescriptorType,
}

impl Descriptor {
    /// Creates a descriptor advertising only its implementation.
    pub fn new(implementation: impl Into<String>) -> Self {
        Self {
            implementation: implementation.into(),
            contracts: BTreeSet::new(),
            scope: PER_LOOKUP.to_string(),
            qualifiers: BTreeSet::new(),
            name: None,
            rank: 0,
            metadata: BTreeMap::new(),
            descriptor_type: DescriptorType::Class,
        }
    }

    /// Contracts this descriptor can be looked up by.
    ///
    /// An empty contract set means the implementation is the sole advertised type.
    pub fn advertised_contracts(&self) -> Vec<&str> {
        if self.contracts.is_empty() {
            vec![self.implementation.as_str()]
        } else {
            self.contracts.iter().map(String::as_str).collect()
        }
    }

    pub fn advertises(&self, contract: &str) -> bool {
        if self.contracts.is_empty() {
            self.implementation == contract
        } else {
            self.contracts.contains(contract)
        }
    }

    /// Checks the structural invariants a registry relies on.
    pub fn validate(&self) -> Result<()> {
        if self.implementation.trim().is_empty() {
            return Err(LocatorError::Configuration(
                "descriptor implementation must not be empty".to_string(),
            ));
        }
        if self.scope.trim().is_empty() {
            return Err(LocatorError::Configuration(format!(
                "descriptor {} has an empty scope",
                self.implementation
            )));
        }
        if self.contracts.iter().any(|c| c.trim().is_empty()) {
            return Err(LocatorError::Configuration(format!(
                "descriptor {} advertises an empty contract",
                self.implementation
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.implementation)?;
        if let Some(name) = &self.name {
            write!(f, "[{}]", name)?;
        }
        write!(f, " @{} rank={}", self.scope, self.rank)
    }
}

/// A descriptor ready to be bound: metadata, injection points and creator.
#[derive(Clone)]
pub struct ActiveDescriptor {
    pub descriptor: Descriptor,
    pub injectees: Vec<Injectee>,
    pub creator: Arc<dyn Creator>,
}

impl ActiveDescriptor {
    pub fn new(descriptor: Descriptor, creator: Arc<dyn Creator>) -> Self {
        Self {
            descriptor,
            injectees: Vec::new(),
            creator,
        }
    }

    pub fn with_injectees(mut self, injectees: Vec<Injectee>) -> Self {
        self.injectees = injectees;
        self
    }
}

impl fmt::Debug for ActiveDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveDescriptor")
            .field("descriptor", &self.descriptor)
            .field("injectees", &self.injectees)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_contracts_advertise_implementation() {
        let descriptor = Descriptor::new("app::Cache");
        assert_eq!(descriptor.advertised_contracts(), vec!["app::Cache"]);
        assert!(descriptor.advertises("app::Cache"));
        assert!(!descriptor.advertises("app::Store"));
    }

    #[test]
    fn test_explicit_contracts_replace_implementation() {
        let mut descriptor = Descriptor::new("app::RedisCache");
        descriptor.contracts.insert("app::Cache".to_string());
        assert!(descriptor.advertises("app::Cache"));
        assert!(!descriptor.advertises("app::RedisCache"));
    }

    #[test]
    fn test_validate_rejects_empty_implementation() {
        let descriptor = Descriptor::new("  ");
        assert!(matches!(
            descriptor.validate(),
            Err(LocatorError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_empty_scope() {
        let mut descriptor = Descriptor::new("app::Cache");
        descriptor.scope.clear();
        assert!(descriptor.validate().is_err());
    }

    #[test]
    fn test_display() {
        let mut descriptor = Descriptor::new("app::Cache");
        descriptor.name = Some("primary".to_string());
        descriptor.rank = 3;
        assert_eq!(descriptor.to_string(), "app::Cache[primary] @per-lookup rank=3");
    }
}
