//! Transactional registry mutation.
//!
//! A [`DynamicConfiguration`] stages descriptor additions and removals and
//! applies them in one [`commit`](DynamicConfiguration::commit):
//!
//! ```ignore
//! let mut config = locator.configuration();
//! let id = config.add_descriptor(descriptor);
//! config.remove_matching(contract_filter("app::LegacyCache"));
//! let change = config.commit()?;
//! ```
//!
//! A commit is all-or-nothing. If any staged operation is invalid the whole
//! session fails with `LocatorError::Configuration` and the registry is left
//! exactly as it was. On success every registered [`ChangeListener`] sees the
//! net change before `commit()` returns.

mod listener;
mod tracker;

pub use listener::{ChangeListener, ChangeSet, ListenerId};
pub use tracker::{Tracker, TrackerEvent};

use std::fmt;

use crate::descriptor::{constant, ActiveDescriptor, DescriptorId};
use crate::error::Result;
use crate::filter::{Filter, IdFilter};
use crate::locator::Locator;

pub(crate) enum StagedOp {
    Add(DescriptorId, ActiveDescriptor),
    Remove(Box<dyn Filter>),
}

/// A configuration session over one locator's registry.
pub struct DynamicConfiguration {
    locator: Locator,
    ops: Vec<StagedOp>,
}

impl DynamicConfiguration {
    pub(crate) fn new(locator: Locator) -> Self {
        Self {
            locator,
            ops: Vec::new(),
        }
    }

    /// Stages `active` for addition and returns the identity it will have.
    pub fn add_descriptor(&mut self, active: ActiveDescriptor) -> DescriptorId {
        let id = self.locator.registry().reserve_id();
        self.ops.push(StagedOp::Add(id, active));
        id
    }

    /// Stages a singleton constant, advertised under its type name.
    pub fn add_constant<T: Send + Sync + 'static>(&mut self, value: T) -> DescriptorId {
        self.add_descriptor(constant(value))
    }

    /// Stages removal of one descriptor.
    pub fn remove_descriptor(&mut self, id: DescriptorId) -> &mut Self {
        self.ops.push(StagedOp::Remove(Box::new(IdFilter(id))));
        self
    }

    /// Stages removal of every descriptor matching `filter` at commit time.
    pub fn remove_matching(&mut self, filter: impl Filter + 'static) -> &mut Self {
        self.ops.push(StagedOp::Remove(Box::new(filter)));
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every staged operation atomically.
    pub fn commit(self) -> Result<ChangeSet> {
        self.locator.commit(self.ops)
    }
}

impl fmt::Debug for DynamicConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicConfiguration")
            .field("locator", &self.locator.name())
            .field("staged", &self.ops.len())
            .finish()
    }
}
