//! Commit notifications.

use std::sync::Arc;

use crate::registry::SystemDescriptor;

/// Net effect of one successful commit.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Descriptors that became visible, in binding order.
    pub added: Vec<Arc<SystemDescriptor>>,
    /// Previously published descriptors that were removed.
    pub removed: Vec<Arc<SystemDescriptor>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Observes successful commits.
///
/// Invoked synchronously, in registration order, before `commit()` returns.
/// Never invoked for a failed commit.
pub trait ChangeListener: Send + Sync {
    fn configuration_changed(&self, change: &ChangeSet);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeSet) + Send + Sync,
{
    fn configuration_changed(&self, change: &ChangeSet) {
        self(change)
    }
}

/// Handle returned by `register_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);
