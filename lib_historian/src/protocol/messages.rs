//! # Client-Facing Result Types
//!
//! Values handed back to callers. All timestamps are Unix seconds in the
//! client's clock; the engine translates them from the server clock before
//! they reach this layer.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Semantic version reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Oldest server version this client can talk to.
pub const MINIMUM_SERVER_VERSION: ServerVersion = ServerVersion::new(1, 2, 0);

/// A loggable entity known to the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub id: u32,
    pub name: String,
}

/// Oldest and newest timestamps the server holds data for.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: f64,
    pub end: f64,
}

/// One sampled value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub value: f64,
}

/// Samples of one node, addressed by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub node: String,
    pub samples: Vec<Sample>,
}

/// Value and origin of a single sender tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagValue {
    pub value: String,
    pub source: String,
}

/// All tags of one sender, keyed by tag name.
pub type TagSet = BTreeMap<String, TagValue>;

/// A logged event.
///
/// `tags` is `None` until the sender's tags have been resolved, and stays
/// `None` when the tag lookup for that sender failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub time: f64,
    pub sender: String,
    pub code: u32,
    pub status: u32,
    pub message: String,
    pub tags: Option<TagSet>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_ordering() {
        assert!(ServerVersion::new(1, 1, 9) < MINIMUM_SERVER_VERSION);
        assert!(ServerVersion::new(1, 2, 0) >= MINIMUM_SERVER_VERSION);
        assert!(ServerVersion::new(2, 0, 0) > MINIMUM_SERVER_VERSION);
        assert_eq!(MINIMUM_SERVER_VERSION.to_string(), "1.2.0");
    }
}
