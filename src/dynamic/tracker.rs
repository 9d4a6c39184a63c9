//! Presence tracking of services by contract.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::{ChangeListener, ChangeSet};
use crate::error::{LocatorError, Result};
use crate::filter::Filter;
use crate::registry::SystemDescriptor;

/// A tracked descriptor appearing or disappearing.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    Appeared(Arc<SystemDescriptor>),
    Disappeared(Arc<SystemDescriptor>),
}

impl TrackerEvent {
    pub fn descriptor(&self) -> &Arc<SystemDescriptor> {
        match self {
            TrackerEvent::Appeared(d) | TrackerEvent::Disappeared(d) => d,
        }
    }
}

type Callback = dyn Fn(&TrackerEvent) + Send + Sync;

/// Listener reporting descriptors of the tracked contracts as they come and go.
///
/// The presence flag selects what is reported: `Some(true)` appearances only,
/// `Some(false)` disappearances only, `None` both.
pub struct Tracker {
    contracts: BTreeSet<String>,
    filter: Option<Box<dyn Filter>>,
    presence: Option<bool>,
    callback: Box<Callback>,
}

impl Tracker {
    pub fn new<I, S, F>(contracts: I, callback: F) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&TrackerEvent) + Send + Sync + 'static,
    {
        let contracts: BTreeSet<String> = contracts.into_iter().map(Into::into).collect();
        if contracts.is_empty() {
            return Err(LocatorError::Configuration(
                "a tracker needs at least one contract".to_string(),
            ));
        }
        Ok(Self {
            contracts,
            filter: None,
            presence: None,
            callback: Box::new(callback),
        })
    }

    /// Finer matching beyond contract names.
    pub fn with_filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Box::new(filter));
        self
    }

    pub fn presence(mut self, presence: Option<bool>) -> Self {
        self.presence = presence;
        self
    }

    fn tracks(&self, descriptor: &SystemDescriptor) -> bool {
        self.contracts
            .iter()
            .any(|c| descriptor.descriptor().advertises(c))
            && self.filter.as_ref().map_or(true, |f| f.matches(descriptor))
    }
}

impl ChangeListener for Tracker {
    fn configuration_changed(&self, change: &ChangeSet) {
        if self.presence != Some(false) {
            for descriptor in change.added.iter().filter(|d| self.tracks(d)) {
                (self.callback)(&TrackerEvent::Appeared(descriptor.clone()));
            }
        }
        if self.presence != Some(true) {
            for descriptor in change.removed.iter().filter(|d| self.tracks(d)) {
                (self.callback)(&TrackerEvent::Disappeared(descriptor.clone()));
            }
        }
    }
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("contracts", &self.contracts)
            .field("presence", &self.presence)
            .finish_non_exhaustive()
    }
}
