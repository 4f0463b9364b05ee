//! # WebSocket Connector
//!
//! Opens a WebSocket with tokio-tungstenite, then splits it into a writer task
//! (draining [`Outbound`]) and a reader task (producing [`TransportEvent`]).
//! Only binary messages carry frames; text frames are logged and ignored,
//! pings and pongs are handled by tungstenite.

use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message as WsMessage};

use super::{Connector, Link, Outbound, TransportEvent};
use crate::error::HistorianError;

/// [`Connector`] for `ws://` (and, with the `tls` feature, `wss://`) URLs.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: &str) -> BoxFuture<'static, Result<Link, HistorianError>> {
        let url = url.to_string();
        Box::pin(async move {
            log::info!("Connecting to historian: {}", url);
            let (ws_stream, _) = connect_async(url.as_str())
                .await
                .map_err(|e| HistorianError::Connection(e.to_string()))?;
            let (mut write, mut read) = ws_stream.split();

            let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<TransportEvent>();

            // Writer: the engine's outbound queue to the socket.
            let writer_events = in_tx.clone();
            tokio::spawn(async move {
                while let Some(out) = out_rx.recv().await {
                    match out {
                        Outbound::Frame(bytes) => {
                            if let Err(e) = write.send(WsMessage::Binary(bytes.into())).await {
                                log::error!("Historian write error: {}", e);
                                let _ = writer_events.send(TransportEvent::Error(e.to_string()));
                                break;
                            }
                        }
                        Outbound::Close => {
                            let _ = write.close().await;
                            break;
                        }
                    }
                }
            });

            // Reader: socket to the engine.
            tokio::spawn(async move {
                while let Some(msg) = read.next().await {
                    match msg {
                        Ok(WsMessage::Binary(bin)) => {
                            log::trace!("Received binary frame: {} bytes", bin.len());
                            if in_tx.send(TransportEvent::Message(bin.to_vec())).is_err() {
                                return;
                            }
                        }
                        Ok(WsMessage::Text(text)) => {
                            log::debug!("Ignoring text frame: {}", text);
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            log::error!("Historian read error: {}", e);
                            let _ = in_tx.send(TransportEvent::Error(e.to_string()));
                            break;
                        }
                    }
                }
                let _ = in_tx.send(TransportEvent::Closed);
            });

            Ok(Link {
                outbound: out_tx,
                inbound: in_rx,
            })
        })
    }
}
