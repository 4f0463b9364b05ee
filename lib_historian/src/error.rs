//! # Error Types
//!
//! A single error enum is shared by every public operation of the client.
//! It is `Clone` because a connection failure is fanned out to every
//! outstanding request with the same reason.

use thiserror::Error;

use crate::protocol::messages::ServerVersion;

/// Errors surfaced by the historian client.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HistorianError {
    /// The server answered the request with an error frame. The message is the
    /// server's text, verbatim.
    #[error("{0}")]
    Server(String),

    /// The server runs a protocol version older than the client supports.
    #[error("server version {found} is older than the minimum supported version {minimum}")]
    IncompatibleVersion {
        found: ServerVersion,
        minimum: ServerVersion,
    },

    /// A node name is still unknown after refreshing the directory.
    #[error("unknown node '{0}'")]
    UnknownNode(String),

    /// The connection failed, was closed, or was never established.
    #[error("connection failure: {0}")]
    Connection(String),

    /// A caller supplied query was rejected before anything was sent.
    #[error("invalid query: {0}")]
    Validation(String),

    /// Time synchronization was switched off while a probe was in flight.
    #[error("time synchronization disabled")]
    SyncDisabled,

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The server answered with a message kind that does not belong to the request.
    #[error("unexpected {got} response to a {expected} request")]
    UnexpectedResponse { expected: String, got: String },

    /// The configured cap on outstanding requests was reached.
    #[error("too many outstanding requests (limit {0})")]
    Overloaded(usize),

    /// The engine task is gone; every client handle is unusable.
    #[error("historian client has shut down")]
    Shutdown,
}

impl From<prost::DecodeError> for HistorianError {
    fn from(e: prost::DecodeError) -> Self {
        HistorianError::Codec(e.to_string())
    }
}

impl From<prost::EncodeError> for HistorianError {
    fn from(e: prost::EncodeError) -> Self {
        HistorianError::Codec(e.to_string())
    }
}

impl From<serde_json::Error> for HistorianError {
    fn from(e: serde_json::Error) -> Self {
        HistorianError::Validation(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, HistorianError>;
