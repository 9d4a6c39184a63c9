//! Descriptor registry.
//!
//! The registry holds the published [`Snapshot`] of a locator's descriptors
//! and a staging area used while a dynamic configuration commits. Mutation
//! is only legal while a staging session is open; outside one, `add` and
//! `remove` fail with [`LocatorError::State`].

mod index;

use std::fmt;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

pub use index::Snapshot;

use crate::creator::Creator;
use crate::descriptor::{ActiveDescriptor, Descriptor, DescriptorId, Injectee};
use crate::dynamic::ChangeSet;
use crate::error::{LocatorError, Result};
use crate::filter::Filter;
use crate::locator::LocatorId;

/// A descriptor as registered in a locator.
pub struct SystemDescriptor {
    id: DescriptorId,
    descriptor: Descriptor,
    rank: AtomicI32,
    injectees: Vec<Injectee>,
    creator: Arc<dyn Creator>,
}

impl SystemDescriptor {
    fn new(id: DescriptorId, active: ActiveDescriptor) -> Self {
        Self {
            id,
            rank: AtomicI32::new(active.descriptor.rank),
            descriptor: active.descriptor,
            injectees: active.injectees,
            creator: active.creator,
        }
    }

    pub fn id(&self) -> DescriptorId {
        self.id
    }

    pub fn locator(&self) -> LocatorId {
        self.id.locator
    }

    /// The descriptor as bound. Its `rank` field is the initial rank; see [`rank`](Self::rank).
    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn implementation(&self) -> &str {
        &self.descriptor.implementation
    }

    pub fn scope(&self) -> &str {
        &self.descriptor.scope
    }

    pub fn rank(&self) -> i32 {
        self.rank.load(Ordering::Acquire)
    }

    /// Changes the rank used to order subsequent queries.
    pub fn set_rank(&self, rank: i32) -> i32 {
        self.rank.swap(rank, Ordering::AcqRel)
    }

    pub fn injectees(&self) -> &[Injectee] {
        &self.injectees
    }

    pub fn creator(&self) -> &Arc<dyn Creator> {
        &self.creator
    }
}

impl fmt::Debug for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemDescriptor")
            .field("id", &self.id)
            .field("descriptor", &self.descriptor)
            .field("rank", &self.rank())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SystemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.descriptor, self.id)
    }
}

struct Staging {
    working: Snapshot,
    added: Vec<Arc<SystemDescriptor>>,
    removed: Vec<Arc<SystemDescriptor>>,
}

/// Indexed, transactionally mutated store of descriptors.
pub struct Registry {
    locator: LocatorId,
    current: RwLock<Arc<Snapshot>>,
    staging: Mutex<Option<Staging>>,
    next_seq: AtomicU64,
}

impl Registry {
    pub fn new(locator: LocatorId) -> Self {
        Self {
            locator,
            current: RwLock::new(Arc::new(Snapshot::default())),
            staging: Mutex::new(None),
            next_seq: AtomicU64::new(1),
        }
    }

    /// The currently published state.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    /// All published descriptors in registration order.
    pub fn get_all(&self) -> Vec<Arc<SystemDescriptor>> {
        self.snapshot().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn get(&self, id: DescriptorId) -> Option<Arc<SystemDescriptor>> {
        self.snapshot().get(id).cloned()
    }

    /// Allocates the next identity; sequence numbers define registration order.
    pub(crate) fn reserve_id(&self) -> DescriptorId {
        DescriptorId {
            locator: self.locator,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Opens a staging session over a copy of the published snapshot.
    pub(crate) fn begin(&self) -> Result<()> {
        let mut staging = self.staging.lock();
        if staging.is_some() {
            return Err(LocatorError::State(
                "a registry transaction is already open".to_string(),
            ));
        }
        *staging = Some(Staging {
            working: (**self.current.read()).clone(),
            added: Vec::new(),
            removed: Vec::new(),
        });
        Ok(())
    }

    /// Stages `active` under a fresh identity.
    pub fn add(&self, active: ActiveDescriptor) -> Result<DescriptorId> {
        let id = self.reserve_id();
        self.add_with_id(id, active)
    }

    pub(crate) fn add_with_id(&self, id: DescriptorId, active: ActiveDescriptor) -> Result<DescriptorId> {
        let mut guard = self.staging.lock();
        let staging = guard.as_mut().ok_or_else(outside_transaction)?;

        if id.locator != self.locator {
            return Err(LocatorError::Configuration(format!(
                "descriptor id {} belongs to another locator",
                id
            )));
        }
        active.descriptor.validate()?;

        let descriptor = Arc::new(SystemDescriptor::new(id, active));
        staging.working.insert(descriptor.clone());
        staging.added.push(descriptor);
        Ok(id)
    }

    /// Stages removal of `id`, returning the descriptor if it was present.
    pub fn remove(&self, id: DescriptorId) -> Result<Option<Arc<SystemDescriptor>>> {
        let mut guard = self.staging.lock();
        let staging = guard.as_mut().ok_or_else(outside_transaction)?;
        Ok(stage_removal(staging, id))
    }

    /// Stages removal of every descriptor matching `filter`.
    pub fn remove_all(&self, filter: &dyn Filter) -> Result<Vec<Arc<SystemDescriptor>>> {
        let mut guard = self.staging.lock();
        let staging = guard.as_mut().ok_or_else(outside_transaction)?;

        let doomed: Vec<DescriptorId> = staging
            .working
            .iter()
            .filter(|d| filter.matches(d))
            .map(|d| d.id())
            .collect();

        Ok(doomed
            .into_iter()
            .filter_map(|id| stage_removal(staging, id))
            .collect())
    }

    /// Runs `f` against the staged working snapshot.
    pub(crate) fn inspect_staged<R>(&self, f: impl FnOnce(&Snapshot, &[Arc<SystemDescriptor>]) -> R) -> Result<R> {
        let guard = self.staging.lock();
        let staging = guard.as_ref().ok_or_else(outside_transaction)?;
        Ok(f(&staging.working, &staging.added))
    }

    /// Publishes the staged snapshot and returns the net change.
    pub(crate) fn publish(&self) -> Result<ChangeSet> {
        let staging = self.staging.lock().take().ok_or_else(outside_transaction)?;
        *self.current.write() = Arc::new(staging.working);
        Ok(ChangeSet {
            added: staging.added,
            removed: staging.removed,
        })
    }

    /// Discards the staged snapshot.
    pub(crate) fn abort(&self) {
        self.staging.lock().take();
    }
}

fn stage_removal(staging: &mut Staging, id: DescriptorId) -> Option<Arc<SystemDescriptor>> {
    let removed = staging.working.remove(id)?;
    if let Some(pos) = staging.added.iter().position(|d| d.id() == id) {
        // Added and removed in the same session: nets out to nothing.
        staging.added.remove(pos);
    } else {
        staging.removed.push(removed.clone());
    }
    Some(removed)
}

fn outside_transaction() -> LocatorError {
    LocatorError::State("registry mutation outside a dynamic configuration".to_string())
}
