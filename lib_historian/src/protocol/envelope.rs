//! # Historian Protobuf Bindings
//!
//! Rust representations of the historian wire schema. Every frame on the
//! socket is an [`Envelope`]; its `body` holds the encoded sub-message that
//! matches `kind`. Requests without parameters carry an empty body.

use prost::Message;

/// Outer frame for every message exchanged with the server.
#[derive(Clone, PartialEq, Message)]
pub struct Envelope {
    /// The kind of the embedded body. Maps to [`MessageKind`].
    #[prost(enumeration = "MessageKind", tag = "1")]
    pub kind: i32,

    /// Correlation identifier chosen by the client and echoed by the server.
    #[prost(uint64, tag = "2")]
    pub request_id: u64,

    /// The encoded sub-message.
    #[prost(bytes = "vec", tag = "3")]
    pub body: Vec<u8>,
}

/// The closed set of message kinds understood by client and server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageKind {
    /// Never sent; the protobuf default.
    Unspecified = 0,
    /// Ask for the server clock
    TimeProbeRequest = 1,
    /// Server clock in nanoseconds since the Unix epoch
    TimeProbeResponse = 2,
    /// Ask for the node directory
    DirectoryRequest = 3,
    /// Full node directory
    DirectoryResponse = 4,
    /// Ask for the oldest and newest stored timestamps
    TimeRangeRequest = 5,
    /// Oldest and newest stored timestamps
    TimeRangeResponse = 6,
    /// Ask for the server version
    VersionRequest = 7,
    /// Server version
    VersionResponse = 8,
    /// Sampled values for a set of nodes
    TimeseriesRequest = 9,
    /// Sampled values, one series per node
    TimeseriesResponse = 10,
    /// Logged events matching a filter
    EventQueryRequest = 11,
    /// A batch of logged events
    EventQueryResponse = 12,
    /// Number of logged events matching a filter
    EventCountRequest = 13,
    /// Event count
    EventCountResponse = 14,
    /// Failure report for one request
    Error = 15,
    /// Descriptive tags of one event sender
    SenderTagRequest = 16,
    /// Tags of one event sender
    SenderTagResponse = 17,
}

/// Body of [`MessageKind::TimeProbeResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct TimeProbeReply {
    /// Server wall clock in nanoseconds since the Unix epoch.
    #[prost(uint64, tag = "1")]
    pub timestamp_ns: u64,
}

/// One loggable entity of the directory.
#[derive(Clone, PartialEq, Message)]
pub struct NodeEntry {
    #[prost(uint32, tag = "1")]
    pub id: u32,
    #[prost(string, tag = "2")]
    pub name: String,
}

/// Body of [`MessageKind::DirectoryResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct DirectoryReply {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<NodeEntry>,
}

/// Body of [`MessageKind::TimeRangeResponse`]. Seconds in the server clock.
#[derive(Clone, PartialEq, Message)]
pub struct TimeRangeReply {
    #[prost(double, tag = "1")]
    pub min: f64,
    #[prost(double, tag = "2")]
    pub max: f64,
}

/// Body of [`MessageKind::VersionResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct VersionReply {
    #[prost(uint32, tag = "1")]
    pub major: u32,
    #[prost(uint32, tag = "2")]
    pub minor: u32,
    #[prost(uint32, tag = "3")]
    pub patch: u32,
}

/// Body of [`MessageKind::TimeseriesRequest`]. Times in the server clock.
#[derive(Clone, PartialEq, Message)]
pub struct TimeseriesRequestBody {
    #[prost(uint32, repeated, tag = "1")]
    pub node_ids: Vec<u32>,
    #[prost(double, tag = "2")]
    pub start: f64,
    #[prost(double, tag = "3")]
    pub end: f64,
    /// Upper bound on returned points per node; absent means server default.
    #[prost(uint32, optional, tag = "4")]
    pub max_points: Option<u32>,
}

/// A single sampled value.
#[derive(Clone, PartialEq, Message)]
pub struct SamplePoint {
    #[prost(double, tag = "1")]
    pub timestamp: f64,
    #[prost(double, tag = "2")]
    pub value: f64,
}

/// Samples of one node.
#[derive(Clone, PartialEq, Message)]
pub struct SeriesEntry {
    #[prost(uint32, tag = "1")]
    pub node_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub points: Vec<SamplePoint>,
}

/// Body of [`MessageKind::TimeseriesResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct TimeseriesReply {
    #[prost(message, repeated, tag = "1")]
    pub series: Vec<SeriesEntry>,
}

/// Body of [`MessageKind::EventQueryRequest`] and [`MessageKind::EventCountRequest`].
#[derive(Clone, PartialEq, Message)]
pub struct EventFilter {
    #[prost(double, tag = "1")]
    pub start: f64,
    #[prost(double, tag = "2")]
    pub end: f64,
    /// Restrict to these senders; empty means all senders.
    #[prost(string, repeated, tag = "3")]
    pub senders: Vec<String>,
    /// Restrict to these event codes; empty means all codes.
    #[prost(uint32, repeated, tag = "4")]
    pub codes: Vec<u32>,
    /// Events must have every bit of this mask set in their status.
    #[prost(uint32, optional, tag = "5")]
    pub status_mask: Option<u32>,
    #[prost(uint32, optional, tag = "6")]
    pub limit: Option<u32>,
}

/// A logged event as stored by the server.
#[derive(Clone, PartialEq, Message)]
pub struct EventRecord {
    #[prost(double, tag = "1")]
    pub timestamp: f64,
    #[prost(string, tag = "2")]
    pub sender: String,
    #[prost(uint32, tag = "3")]
    pub code: u32,
    #[prost(uint32, tag = "4")]
    pub status: u32,
    #[prost(string, tag = "5")]
    pub message: String,
}

/// Body of [`MessageKind::EventQueryResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct EventQueryReply {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<EventRecord>,
}

/// Body of [`MessageKind::EventCountResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct EventCountReply {
    #[prost(uint64, tag = "1")]
    pub count: u64,
}

/// Body of [`MessageKind::Error`].
#[derive(Clone, PartialEq, Message)]
pub struct ErrorReply {
    #[prost(string, tag = "1")]
    pub message: String,
}

/// Body of [`MessageKind::SenderTagRequest`].
#[derive(Clone, PartialEq, Message)]
pub struct SenderTagRequestBody {
    #[prost(string, tag = "1")]
    pub sender: String,
}

/// One descriptive tag of a sender.
#[derive(Clone, PartialEq, Message)]
pub struct TagEntry {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub value: String,
    /// Where the tag value came from (configuration, discovery, ...).
    #[prost(string, tag = "3")]
    pub source: String,
}

/// Body of [`MessageKind::SenderTagResponse`].
#[derive(Clone, PartialEq, Message)]
pub struct SenderTagReply {
    #[prost(string, tag = "1")]
    pub sender: String,
    #[prost(message, repeated, tag = "2")]
    pub tags: Vec<TagEntry>,
}
