//! # Request Queue
//!
//! Holds requests created while the connection is not ready (not open, or
//! open but still waiting for the first clock synchronization). Descriptors
//! are kept in id order so a flush replays them exactly as they were issued.

use std::collections::BTreeMap;

use super::registry::RequestId;

/// Deferred request descriptors keyed by id.
pub struct RequestQueue<R> {
    queued: BTreeMap<RequestId, R>,
}

impl<R> Default for RequestQueue<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RequestQueue<R> {
    pub fn new() -> Self {
        Self { queued: BTreeMap::new() }
    }

    pub fn push(&mut self, id: RequestId, request: R) {
        self.queued.insert(id, request);
    }

    /// Removes every descriptor, ascending id order.
    pub fn drain(&mut self) -> Vec<(RequestId, R)> {
        std::mem::take(&mut self.queued).into_iter().collect()
    }

    #[cfg(test)]
    pub fn contains(&self, id: RequestId) -> bool {
        self.queued.contains_key(&id)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_replays_in_id_order() {
        let mut q = RequestQueue::new();
        q.push(RequestId::new(9), "c");
        q.push(RequestId::new(2), "a");
        q.push(RequestId::new(5), "b");
        let order: Vec<&str> = q.drain().into_iter().map(|(_, r)| r).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert!(q.is_empty());
    }

    #[test]
    fn test_contains() {
        let mut q = RequestQueue::new();
        q.push(RequestId::new(1), ());
        assert!(q.contains(RequestId::new(1)));
        assert!(!q.contains(RequestId::new(2)));
        assert_eq!(q.len(), 1);
    }
}
