//! Descriptor selection.
//!
//! A [`Filter`] is a predicate over registered descriptors. Filters that also
//! implement [`IndexedFilter`] expose a contract and/or name so [`select`] can
//! narrow candidates through the registry index before testing the predicate.
//!
//! Results are always ordered by descending rank, then ascending registration
//! order. Resolution takes the first result, so this ordering decides which
//! implementation wins.

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::registry::{Registry, Snapshot, SystemDescriptor};

/// Predicate selecting descriptors.
pub trait Filter: Send + Sync {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool;

    /// Index keys, when the filter has them.
    fn as_indexed(&self) -> Option<&dyn IndexedFilter> {
        None
    }
}

/// A filter with fast-lookup keys.
///
/// Every descriptor the filter matches must advertise `advertised_contract`
/// (when given) and carry `name` (when given).
pub trait IndexedFilter: Filter {
    fn advertised_contract(&self) -> Option<&str>;
    fn name(&self) -> Option<&str>;
}

impl<F> Filter for F
where
    F: Fn(&SystemDescriptor) -> bool + Send + Sync,
{
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        self(descriptor)
    }
}

/// Matches every descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFilter;

impl Filter for AllFilter {
    fn matches(&self, _descriptor: &SystemDescriptor) -> bool {
        true
    }
}

pub fn all_filter() -> AllFilter {
    AllFilter
}

/// Indexed filter on contract and/or name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFilter {
    contract: Option<String>,
    name: Option<String>,
}

impl Filter for KeyFilter {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        let d = descriptor.descriptor();
        self.contract.as_deref().map_or(true, |c| d.advertises(c))
            && self.name.as_deref().map_or(true, |n| d.name.as_deref() == Some(n))
    }

    fn as_indexed(&self) -> Option<&dyn IndexedFilter> {
        Some(self)
    }
}

impl IndexedFilter for KeyFilter {
    fn advertised_contract(&self) -> Option<&str> {
        self.contract.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

pub fn contract_filter(contract: impl Into<String>) -> KeyFilter {
    KeyFilter {
        contract: Some(contract.into()),
        name: None,
    }
}

pub fn name_filter(name: impl Into<String>) -> KeyFilter {
    KeyFilter {
        contract: None,
        name: Some(name.into()),
    }
}

pub fn name_and_contract_filter(contract: impl Into<String>, name: impl Into<String>) -> KeyFilter {
    KeyFilter {
        contract: Some(contract.into()),
        name: Some(name.into()),
    }
}

/// Matches a single registered descriptor by identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdFilter(pub crate::descriptor::DescriptorId);

impl Filter for IdFilter {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        descriptor.id() == self.0
    }
}

/// A service request: contract, required qualifiers and optional name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lookup {
    pub contract: String,
    pub qualifiers: BTreeSet<String>,
    pub name: Option<String>,
}

impl Lookup {
    pub fn contract(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            qualifiers: BTreeSet::new(),
            name: None,
        }
    }

    pub fn of_type<T: ?Sized + 'static>() -> Self {
        Self::contract(std::any::type_name::<T>())
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn qualified_by(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifiers.insert(qualifier.into());
        self
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.contract)?;
        if let Some(name) = &self.name {
            write!(f, "[{}]", name)?;
        }
        for qualifier in &self.qualifiers {
            write!(f, " @{}", qualifier)?;
        }
        Ok(())
    }
}

impl Filter for Lookup {
    fn matches(&self, descriptor: &SystemDescriptor) -> bool {
        let d = descriptor.descriptor();
        d.advertises(&self.contract)
            && self
                .name
                .as_deref()
                .map_or(true, |n| d.name.as_deref() == Some(n))
            && self.qualifiers.is_subset(&d.qualifiers)
    }

    fn as_indexed(&self) -> Option<&dyn IndexedFilter> {
        Some(self)
    }
}

impl IndexedFilter for Lookup {
    fn advertised_contract(&self) -> Option<&str> {
        Some(&self.contract)
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// Sort key: rank descending, then registration order ascending.
///
/// Ranks are mutable, so each descriptor's rank is read once per sort.
pub fn rank_key(descriptor: &SystemDescriptor) -> (Reverse<i32>, u64) {
    (Reverse(descriptor.rank()), descriptor.id().seq)
}

/// Selects the descriptors in `registry` matching `filter`, in rank order.
pub fn select(registry: &Registry, filter: &dyn Filter) -> Vec<Arc<SystemDescriptor>> {
    select_from(&registry.snapshot(), filter)
}

pub(crate) fn select_from(snapshot: &Snapshot, filter: &dyn Filter) -> Vec<Arc<SystemDescriptor>> {
    let keys = filter
        .as_indexed()
        .map(|indexed| (indexed.advertised_contract(), indexed.name()));

    let candidates: Vec<&Arc<SystemDescriptor>> = match keys {
        Some((Some(contract), _)) => snapshot.by_contract(contract).collect(),
        Some((None, Some(name))) => snapshot.by_name(name).collect(),
        _ => snapshot.iter().collect(),
    };

    let mut selected: Vec<Arc<SystemDescriptor>> = candidates
        .into_iter()
        .filter(|d| filter.matches(d))
        .cloned()
        .collect();
    selected.sort_by_cached_key(|d| rank_key(d));
    selected
}
