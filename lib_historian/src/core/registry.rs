//! # Correlation Registry
//!
//! Allocates request identifiers and maps every outstanding identifier to the
//! value waiting for its answer.
//!
//! Flow:
//! 1. The engine calls `allocate()` for a fresh id (time probes use the same
//!    allocator, so two ids are never equal).
//! 2. `register()` stores the waiter under that id.
//! 3. The response (or error frame) for the id calls `settle()`, which hands
//!    the waiter back exactly once.
//! 4. A connection failure calls `fail_all()`, which empties the map.

use std::collections::BTreeMap;
use std::fmt;

/// Correlation identifier carried in every envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outstanding requests keyed by id.
///
/// Generic over the waiter so the engine can park caller channels, time
/// probes and tag lookups side by side.
pub struct Registry<W> {
    next_id: u64,
    pending: BTreeMap<RequestId, W>,
}

impl<W> Default for Registry<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> Registry<W> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: BTreeMap::new(),
        }
    }

    /// Returns a fresh id, strictly greater than every id returned before.
    pub fn allocate(&mut self) -> RequestId {
        let id = RequestId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Parks `waiter` under `id`.
    ///
    /// Ids come from `allocate()`, so a collision means a bug in the caller;
    /// the first waiter is kept and the new one is handed back.
    pub fn register(&mut self, id: RequestId, waiter: W) -> Option<W> {
        if self.pending.contains_key(&id) {
            log::error!("Request {} is already registered", id);
            return Some(waiter);
        }
        self.pending.insert(id, waiter);
        None
    }

    /// Removes and returns the waiter for `id`.
    ///
    /// Unknown ids (late or duplicate responses) return `None`; the caller
    /// drops the response.
    pub fn settle(&mut self, id: RequestId) -> Option<W> {
        self.pending.remove(&id)
    }

    /// Empties the registry, returning every waiter in ascending id order.
    pub fn fail_all(&mut self) -> Vec<(RequestId, W)> {
        std::mem::take(&mut self.pending).into_iter().collect()
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id)
    }

    #[cfg(test)]
    pub fn get(&self, id: RequestId) -> Option<&W> {
        self.pending.get(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
