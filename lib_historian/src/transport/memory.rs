//! # In-Memory Connector
//!
//! A transport made of two channel pairs. Every `connect` call shows up at
//! the [`MemoryListener`]; the connection only opens when the listener
//! accepts it, which lets a test decide exactly when the "open" event fires.

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};

use super::{Connector, Link, Outbound, TransportEvent};
use crate::error::HistorianError;

struct PendingConnection {
    peer: MemoryPeer,
    open: oneshot::Sender<()>,
}

/// Client side: hand this to the client builder.
#[derive(Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<PendingConnection>,
}

/// Server side: accepts or refuses connection attempts.
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<PendingConnection>,
}

impl MemoryConnector {
    pub fn pair() -> (MemoryConnector, MemoryListener) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MemoryConnector { incoming: tx }, MemoryListener { incoming: rx })
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Link, HistorianError>> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (open_tx, open_rx) = oneshot::channel();
        let peer = MemoryPeer {
            url: url.to_string(),
            from_client: out_rx,
            to_client: in_tx,
        };
        let offered = self
            .incoming
            .send(PendingConnection { peer, open: open_tx })
            .is_ok();

        Box::pin(async move {
            if !offered {
                return Err(HistorianError::Connection("listener is gone".to_string()));
            }
            open_rx
                .await
                .map_err(|_| HistorianError::Connection("connection refused".to_string()))?;
            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}

impl MemoryListener {
    /// Waits for the next connection attempt and opens it.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        let pending = self.incoming.recv().await?;
        let _ = pending.open.send(());
        Some(pending.peer)
    }

    /// Waits for the next connection attempt and refuses it. Returns the URL
    /// that was dialled.
    pub async fn refuse(&mut self) -> Option<String> {
        let pending = self.incoming.recv().await?;
        Some(pending.peer.url)
    }

    /// A connection attempt that is already waiting, if any.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        let pending = self.incoming.try_recv().ok()?;
        let _ = pending.open.send(());
        Some(pending.peer)
    }
}

/// The server end of one in-memory connection.
pub struct MemoryPeer {
    url: String,
    from_client: mpsc::UnboundedReceiver<Outbound>,
    to_client: mpsc::UnboundedSender<TransportEvent>,
}

impl MemoryPeer {
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Next frame written by the client; `None` once the client closed.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        match self.from_client.recv().await? {
            Outbound::Frame(bytes) => Some(bytes),
            Outbound::Close => None,
        }
    }

    /// A frame that is already waiting, if any.
    pub fn try_recv(&mut self) -> Option<Vec<u8>> {
        match self.from_client.try_recv().ok()? {
            Outbound::Frame(bytes) => Some(bytes),
            Outbound::Close => None,
        }
    }

    pub fn send(&self, bytes: Vec<u8>) {
        let _ = self.to_client.send(TransportEvent::Message(bytes));
    }

    /// Reports a transport error followed by a close.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Error(reason.to_string()));
        let _ = self.to_client.send(TransportEvent::Closed);
    }

    /// Reports a clean close.
    pub fn close(&self) {
        let _ = self.to_client.send(TransportEvent::Closed);
    }
}
