//! A small historian stand-in served over a real WebSocket on localhost.
//!
//! It answers every request kind from canned data, keeps its clock a fixed
//! number of seconds behind the host clock and counts connections and
//! sender-tag lookups so tests can assert on them.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use lib_historian::protocol::envelope::{
    DirectoryReply, ErrorReply, EventCountReply, EventQueryReply, EventRecord, NodeEntry, SamplePoint,
    SenderTagReply, SeriesEntry, TagEntry, TimeProbeReply, TimeRangeReply, TimeseriesReply, VersionReply,
};
use lib_historian::protocol::{EnvelopeCodec, Frame, ProstCodec, WireMessage};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

pub const NODES: [(u32, &str); 2] = [(1, "boiler.temp"), (2, "boiler.pressure")];

/// Handle to a running stand-in. The server stops with the test runtime.
pub struct StandIn {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    tag_lookups: Arc<AtomicUsize>,
    kick: broadcast::Sender<()>,
}

impl StandIn {
    /// Binds to an ephemeral localhost port and starts serving.
    pub async fn spawn(clock_lag_secs: f64) -> std::io::Result<StandIn> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let connections = Arc::new(AtomicUsize::new(0));
        let tag_lookups = Arc::new(AtomicUsize::new(0));
        let (kick, _) = broadcast::channel(4);

        let state = (connections.clone(), tag_lookups.clone(), kick.clone());
        tokio::spawn(async move {
            let (connections, tag_lookups, kick) = state;
            while let Ok((stream, peer)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                log::debug!("Stand-in accepted {}", peer);
                tokio::spawn(serve(stream, clock_lag_secs, tag_lookups.clone(), kick.subscribe()));
            }
        });

        Ok(StandIn {
            addr,
            connections,
            tag_lookups,
            kick,
        })
    }

    pub fn url(&self) -> String {
        format!("ws://{}/", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn tag_lookups(&self) -> usize {
        self.tag_lookups.load(Ordering::SeqCst)
    }

    /// Closes every open connection from the server side.
    pub fn kick(&self) {
        let _ = self.kick.send(());
    }
}

async fn serve(stream: TcpStream, lag: f64, tag_lookups: Arc<AtomicUsize>, mut kick: broadcast::Receiver<()>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            log::warn!("Stand-in handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = kick.recv() => {
                let _ = write.close().await;
                return;
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Binary(data))) => {
                    let frame = match ProstCodec.decode(&data) {
                        Ok(frame) => frame,
                        Err(e) => {
                            log::warn!("Stand-in got a bad frame: {}", e);
                            continue;
                        }
                    };
                    if matches!(frame.message, WireMessage::SenderTagRequest(_)) {
                        tag_lookups.fetch_add(1, Ordering::SeqCst);
                    }
                    let reply = Frame::new(frame.request_id, answer(frame.message, lag));
                    let bytes = match ProstCodec.encode(&reply) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            log::warn!("Stand-in cannot encode reply: {}", e);
                            continue;
                        }
                    };
                    if write.send(Message::Binary(bytes.into())).await.is_err() {
                        return;
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            }
        }
    }
}

fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn answer(request: WireMessage, lag: f64) -> WireMessage {
    match request {
        WireMessage::TimeProbeRequest => WireMessage::TimeProbeResponse(TimeProbeReply {
            timestamp_ns: ((now() - lag) * 1e9) as u64,
        }),
        WireMessage::VersionRequest => WireMessage::VersionResponse(VersionReply {
            major: 1,
            minor: 3,
            patch: 0,
        }),
        WireMessage::DirectoryRequest => WireMessage::DirectoryResponse(DirectoryReply {
            nodes: NODES
                .iter()
                .map(|(id, name)| NodeEntry {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
        }),
        WireMessage::TimeRangeRequest => WireMessage::TimeRangeResponse(TimeRangeReply {
            min: 1000.0,
            max: 2000.0,
        }),
        // Echo the window edges as samples, so callers can check both translations.
        WireMessage::TimeseriesRequest(body) => WireMessage::TimeseriesResponse(TimeseriesReply {
            series: body
                .node_ids
                .iter()
                .map(|id| SeriesEntry {
                    node_id: *id,
                    points: vec![
                        SamplePoint {
                            timestamp: body.start,
                            value: f64::from(*id),
                        },
                        SamplePoint {
                            timestamp: body.end,
                            value: f64::from(*id) * 2.0,
                        },
                    ],
                })
                .collect(),
        }),
        WireMessage::EventQueryRequest(filter) => WireMessage::EventQueryResponse(EventQueryReply {
            events: ["A", "B", "A"]
                .iter()
                .enumerate()
                .map(|(i, sender)| EventRecord {
                    timestamp: filter.start + i as f64,
                    sender: sender.to_string(),
                    code: 100 + i as u32,
                    status: 1,
                    message: format!("event {}", i),
                })
                .collect(),
        }),
        WireMessage::EventCountRequest(_) => WireMessage::EventCountResponse(EventCountReply { count: 42 }),
        WireMessage::SenderTagRequest(body) if body.sender == "ghost" => WireMessage::Error(ErrorReply {
            message: format!("no sender named {}", body.sender),
        }),
        WireMessage::SenderTagRequest(body) => WireMessage::SenderTagResponse(SenderTagReply {
            tags: vec![TagEntry {
                name: "site".to_string(),
                value: format!("site-{}", body.sender),
                source: "stand-in".to_string(),
            }],
            sender: body.sender,
        }),
        other => WireMessage::Error(ErrorReply {
            message: format!("unsupported request {:?}", other.kind()),
        }),
    }
}
