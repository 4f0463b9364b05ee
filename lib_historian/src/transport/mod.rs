//! # Transport Module
//!
//! The engine never touches a socket directly. A [`Connector`] opens a
//! connection and returns a [`Link`]: an outbound channel the engine writes
//! frames into and an inbound channel of [`TransportEvent`]s. The I/O itself
//! runs in tasks owned by the connector, so the engine loop never blocks on
//! the network.
//!
//! - **`ws`**: WebSocket connector (binary frames) built on tokio-tungstenite.
//! - **`memory`**: in-process connector whose peer is driven by tests.

use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::HistorianError;

/// In-process transport for tests and embedding.
pub mod memory;
/// WebSocket transport.
#[cfg(feature = "ws")]
pub mod ws;

pub use memory::{MemoryConnector, MemoryListener, MemoryPeer};
#[cfg(feature = "ws")]
pub use ws::WsConnector;

/// Something the engine asks the transport to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Write one binary message.
    Frame(Vec<u8>),
    /// Close the connection.
    Close,
}

/// Something the transport reports to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// One binary message arrived.
    Message(Vec<u8>),
    /// The connection failed. A `Closed` event follows.
    Error(String),
    /// The connection is gone.
    Closed,
}

/// An open connection.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<Outbound>,
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens connections to a server address.
pub trait Connector: Send + Sync + 'static {
    /// Resolves once the connection is open.
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Link, HistorianError>>;
}
