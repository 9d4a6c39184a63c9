//! Immutable registry snapshot with contract and name indexes.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::SystemDescriptor;
use crate::descriptor::DescriptorId;

/// One published state of a registry.
///
/// Readers hold an `Arc<Snapshot>`; a commit builds a new snapshot and swaps
/// it in, so a reader sees either all of a transaction or none of it.
#[derive(Clone, Default)]
pub struct Snapshot {
    entries: BTreeMap<u64, Arc<SystemDescriptor>>,
    by_contract: HashMap<String, BTreeSet<u64>>,
    by_name: HashMap<String, BTreeSet<u64>>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: DescriptorId) -> Option<&Arc<SystemDescriptor>> {
        self.entries
            .get(&id.seq)
            .filter(|descriptor| descriptor.id() == id)
    }

    /// All descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SystemDescriptor>> {
        self.entries.values()
    }

    /// Descriptors advertising `contract`, in registration order.
    pub fn by_contract<'a>(
        &'a self,
        contract: &str,
    ) -> impl Iterator<Item = &'a Arc<SystemDescriptor>> + 'a {
        self.lookup(self.by_contract.get(contract))
    }

    /// Descriptors named `name`, in registration order.
    pub fn by_name<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Arc<SystemDescriptor>> + 'a {
        self.lookup(self.by_name.get(name))
    }

    fn lookup<'a>(
        &'a self,
        keys: Option<&'a BTreeSet<u64>>,
    ) -> impl Iterator<Item = &'a Arc<SystemDescriptor>> + 'a {
        keys.into_iter()
            .flatten()
            .filter_map(move |seq| self.entries.get(seq))
    }

    pub(crate) fn insert(&mut self, descriptor: Arc<SystemDescriptor>) {
        let seq = descriptor.id().seq;
        for contract in descriptor.descriptor().advertised_contracts() {
            self.by_contract
                .entry(contract.to_string())
                .or_default()
                .insert(seq);
        }
        if let Some(name) = &descriptor.descriptor().name {
            self.by_name.entry(name.clone()).or_default().insert(seq);
        }
        self.entries.insert(seq, descriptor);
    }

    pub(crate) fn remove(&mut self, id: DescriptorId) -> Option<Arc<SystemDescriptor>> {
        self.get(id)?;
        let descriptor = self.entries.remove(&id.seq)?;
        for contract in descriptor.descriptor().advertised_contracts() {
            unindex(&mut self.by_contract, contract, id.seq);
        }
        if let Some(name) = &descriptor.descriptor().name {
            unindex(&mut self.by_name, name, id.seq);
        }
        Some(descriptor)
    }
}

fn unindex(index: &mut HashMap<String, BTreeSet<u64>>, key: &str, seq: u64) {
    if let Some(set) = index.get_mut(key) {
        set.remove(&seq);
        if set.is_empty() {
            index.remove(key);
        }
    }
}
