//! # Dependent Lookups
//!
//! State behind the two secondary lookups the engine performs on behalf of a
//! primary request:
//!
//! - [`NodeDirectory`]: node name ↔ id, replaced wholesale by every directory
//!   listing.
//! - [`SenderTags`]: sender → tag set cache, plus the waiters of lookups that
//!   are still on the wire so concurrent callers share one request.

use std::collections::HashMap;

use tokio::sync::oneshot;

use crate::error::HistorianError;
use crate::protocol::envelope::{DirectoryReply, SenderTagReply};
use crate::protocol::messages::{TagSet, TagValue};

/// Name ↔ id mapping of the loggable entities.
#[derive(Debug, Default, Clone)]
pub struct NodeDirectory {
    by_name: HashMap<String, u32>,
    by_id: HashMap<u32, String>,
}

impl NodeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole directory with the listing.
    pub fn replace(&mut self, reply: &DirectoryReply) {
        self.by_name.clear();
        self.by_id.clear();
        for node in &reply.nodes {
            self.by_name.insert(node.name.clone(), node.id);
            self.by_id.insert(node.id, node.name.clone());
        }
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// First name of `names` that is not in the directory.
    pub fn first_missing<'a>(&self, names: &'a [String]) -> Option<&'a str> {
        names.iter().map(String::as_str).find(|n| !self.by_name.contains_key(*n))
    }

    /// Ids for `names`, or the first missing name.
    pub fn resolve(&self, names: &[String]) -> Result<Vec<u32>, String> {
        names
            .iter()
            .map(|n| self.id_of(n).ok_or_else(|| n.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// Reply channel of one caller waiting for a sender's tags.
pub type TagWaiter = oneshot::Sender<Result<TagSet, HistorianError>>;

/// Outcome of asking for a sender's tags.
pub enum TagLookup {
    /// Tags were cached; the waiter was answered.
    Cached,
    /// A lookup for this sender is already in flight; the waiter joined it.
    Joined,
    /// No lookup in flight; the caller must issue one.
    Start,
}

/// Sender tag cache and in-flight lookups.
#[derive(Default)]
pub struct SenderTags {
    cache: HashMap<String, TagSet>,
    pending: HashMap<String, Vec<TagWaiter>>,
}

impl SenderTags {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn cached(&self, sender: &str) -> Option<&TagSet> {
        self.cache.get(sender)
    }

    #[cfg(test)]
    pub fn is_pending(&self, sender: &str) -> bool {
        self.pending.contains_key(sender)
    }

    /// Answers from the cache, joins an in-flight lookup, or registers the
    /// waiter as the first of a new lookup.
    pub fn request(&mut self, sender: &str, waiter: TagWaiter) -> TagLookup {
        if let Some(tags) = self.cache.get(sender) {
            let _ = waiter.send(Ok(tags.clone()));
            return TagLookup::Cached;
        }
        match self.pending.get_mut(sender) {
            Some(waiters) => {
                waiters.push(waiter);
                TagLookup::Joined
            }
            None => {
                self.pending.insert(sender.to_string(), vec![waiter]);
                TagLookup::Start
            }
        }
    }

    /// Caches a successful lookup and answers every waiter of `sender`.
    pub fn complete(&mut self, sender: &str, reply: &SenderTagReply) -> TagSet {
        let tags: TagSet = reply
            .tags
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    TagValue {
                        value: t.value.clone(),
                        source: t.source.clone(),
                    },
                )
            })
            .collect();
        self.cache.insert(sender.to_string(), tags.clone());
        for waiter in self.pending.remove(sender).unwrap_or_default() {
            let _ = waiter.send(Ok(tags.clone()));
        }
        tags
    }

    /// Fails every waiter of `sender`; nothing is cached.
    pub fn fail(&mut self, sender: &str, error: &HistorianError) {
        for waiter in self.pending.remove(sender).unwrap_or_default() {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    /// Fails every waiter of every sender.
    pub fn fail_all(&mut self, error: &HistorianError) {
        for (_, waiters) in self.pending.drain() {
            for waiter in waiters {
                let _ = waiter.send(Err(error.clone()));
            }
        }
    }
}
