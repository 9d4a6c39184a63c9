//! Ambient active-boundary table.
//!
//! Maps each thread to the stack of request boundaries it has activated.
//! Request contexts write it from `begin`/`suspend`/`resume`/`end`, and
//! proxies read it at call time to find which locator's boundary is current
//! for the calling thread. The only other implicit per-thread state is the
//! construction stack kept by resolution.

use std::collections::HashMap;
use std::thread::{self, ThreadId};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use ulid::Ulid;

use super::BoundaryId;
use crate::locator::WeakLocator;

#[derive(Clone, Debug)]
pub(crate) struct Activation {
    pub(crate) scope: String,
    pub(crate) context: Ulid,
    pub(crate) boundary: BoundaryId,
    pub(crate) locator: WeakLocator,
    depth: usize,
}

impl Activation {
    pub(crate) fn new(scope: &str, context: Ulid, boundary: BoundaryId, locator: WeakLocator) -> Self {
        Self {
            scope: scope.to_string(),
            context,
            boundary,
            locator,
            depth: 1,
        }
    }
}

static ACTIVATIONS: Lazy<Mutex<HashMap<ThreadId, Vec<Activation>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Pushes `activation` for the calling thread.
pub(crate) fn activate(activation: Activation) {
    ACTIVATIONS
        .lock()
        .entry(thread::current().id())
        .or_default()
        .push(activation);
}

/// Re-enters the calling thread's active boundary of `context`, if any.
pub(crate) fn reenter(context: Ulid) -> Option<BoundaryId> {
    let mut table = ACTIVATIONS.lock();
    let stack = table.get_mut(&thread::current().id())?;
    let activation = stack.iter_mut().rev().find(|a| a.context == context)?;
    activation.depth += 1;
    Some(activation.boundary)
}

/// Leaves one nesting level; returns the boundary and whether it is now fully exited.
pub(crate) fn exit(context: Ulid) -> Option<(BoundaryId, bool)> {
    let mut table = ACTIVATIONS.lock();
    let id = thread::current().id();
    let stack = table.get_mut(&id)?;
    let pos = stack.iter().rposition(|a| a.context == context)?;
    stack[pos].depth -= 1;
    let boundary = stack[pos].boundary;
    let finished = stack[pos].depth == 0;
    if finished {
        stack.remove(pos);
        if stack.is_empty() {
            table.remove(&id);
        }
    }
    Some((boundary, finished))
}

/// Removes the calling thread's activation of `context` regardless of nesting.
pub(crate) fn deactivate(context: Ulid) -> Option<Activation> {
    let mut table = ACTIVATIONS.lock();
    let id = thread::current().id();
    let stack = table.get_mut(&id)?;
    let pos = stack.iter().rposition(|a| a.context == context)?;
    let activation = stack.remove(pos);
    if stack.is_empty() {
        table.remove(&id);
    }
    Some(activation)
}

/// The calling thread's active boundary of `context`.
pub(crate) fn boundary_for(context: Ulid) -> Option<BoundaryId> {
    let table = ACTIVATIONS.lock();
    table
        .get(&thread::current().id())?
        .iter()
        .rev()
        .find(|a| a.context == context)
        .map(|a| a.boundary)
}

/// The calling thread's most recent activation of any context for `scope`.
pub(crate) fn current(scope: &str) -> Option<Activation> {
    let table = ACTIVATIONS.lock();
    table
        .get(&thread::current().id())?
        .iter()
        .rev()
        .find(|a| a.scope == scope)
        .cloned()
}

/// Drops activations of `context` on every thread, limited to `boundary` when given.
pub(crate) fn purge(context: Ulid, boundary: Option<BoundaryId>) {
    let mut table = ACTIVATIONS.lock();
    for stack in table.values_mut() {
        stack.retain(|a| a.context != context || boundary.map_or(false, |b| a.boundary != b));
    }
    table.retain(|_, stack| !stack.is_empty());
}
