//! # Protocol Module
//!
//! Everything that describes what travels over the socket and what callers
//! get back:
//!
//! - **`envelope`**: protobuf bindings of the wire schema.
//! - **`codec`**: the [`EnvelopeCodec`] seam and its protobuf implementation.
//! - **`messages`**: typed, client-clock results returned to callers.
//! - **`query`**: validated caller filters.

/// Protobuf bindings for the envelope and every sub-message.
pub mod envelope;
/// Frame encoding and decoding.
pub mod codec;
/// Result types handed to callers.
pub mod messages;
/// Typed and validated caller queries.
pub mod query;

pub use codec::{EnvelopeCodec, Frame, ProstCodec, WireMessage};
pub use envelope::MessageKind;
pub use messages::{Event, Node, Sample, Series, ServerVersion, TagSet, TagValue, TimeRange, MINIMUM_SERVER_VERSION};
pub use query::{EventQuery, TimeseriesQuery};
