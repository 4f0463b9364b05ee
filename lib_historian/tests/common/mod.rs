//! Scripted historian server for engine tests.
#![allow(dead_code)]

use lib_historian::core::clock::ManualClock;
use lib_historian::core::registry::RequestId;
use lib_historian::protocol::envelope::{
    DirectoryReply, ErrorReply, EventQueryReply, EventRecord, NodeEntry, SenderTagReply, TagEntry, TimeProbeReply,
};
use lib_historian::protocol::{EnvelopeCodec, Frame, ProstCodec, WireMessage};
use lib_historian::transport::{MemoryConnector, MemoryListener, MemoryPeer};
use lib_historian::{Client, ClientConfig, Clock};

/// Local time at which every test starts.
pub const T0: f64 = 1_700_000_000.0;

pub fn config(time_sync: bool) -> ClientConfig {
    ClientConfig {
        url: "mem://historian".to_string(),
        time_sync,
        ..Default::default()
    }
}

pub struct Harness {
    pub client: Client,
    pub listener: MemoryListener,
    pub clock: ManualClock,
}

pub fn start(config: ClientConfig) -> Harness {
    let (connector, listener) = MemoryConnector::pair();
    let clock = ManualClock::new(T0);
    let client = Client::builder(config)
        .connector(connector)
        .clock(clock.clone())
        .connect()
        .expect("client starts");
    Harness {
        client,
        listener,
        clock,
    }
}

impl Harness {
    /// Accepts the next connection attempt.
    pub async fn accept(&mut self) -> FakeServer {
        let peer = self.listener.accept().await.expect("client dials");
        FakeServer { peer }
    }
}

/// Lets every ready task run until none is left.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub struct FakeServer {
    peer: MemoryPeer,
}

impl FakeServer {
    /// Address the client dialled.
    pub fn url(&self) -> &str {
        self.peer.url()
    }

    /// Next frame written by the client.
    pub async fn next(&mut self) -> Frame {
        let bytes = self.peer.recv().await.expect("client closed the connection");
        ProstCodec.decode(&bytes).expect("client sent a valid frame")
    }

    /// A frame that was already written, if any.
    pub async fn try_next(&mut self) -> Option<Frame> {
        settle().await;
        let bytes = self.peer.try_recv()?;
        Some(ProstCodec.decode(&bytes).expect("client sent a valid frame"))
    }

    /// True once the client closed its end.
    pub async fn closed(&mut self) -> bool {
        self.peer.recv().await.is_none()
    }

    pub fn reply(&self, id: RequestId, message: WireMessage) {
        let bytes = ProstCodec.encode(&Frame::new(id, message)).expect("encodable");
        self.peer.send(bytes);
    }

    pub fn reply_error(&self, id: RequestId, message: &str) {
        self.reply(
            id,
            WireMessage::Error(ErrorReply {
                message: message.to_string(),
            }),
        );
    }

    /// Answers one clock probe as a server whose clock is `offset` seconds
    /// behind the client, with the given round trip.
    pub async fn answer_probe(&mut self, clock: &ManualClock, rtt: f64, offset: f64) {
        let frame = self.next().await;
        assert_eq!(frame.message, WireMessage::TimeProbeRequest, "expected a clock probe");
        let sent = clock.now();
        clock.advance(rtt);
        let server_time = sent + rtt / 2.0 - offset;
        self.reply(
            frame.request_id,
            WireMessage::TimeProbeResponse(TimeProbeReply {
                timestamp_ns: (server_time * 1e9).round() as u64,
            }),
        );
    }

    /// Runs a full three-probe cycle with zero round trip.
    pub async fn sync(&mut self, clock: &ManualClock, offset: f64) {
        for _ in 0..3 {
            self.answer_probe(clock, 0.0, offset).await;
        }
    }

    pub fn fail(&self, reason: &str) {
        self.peer.fail(reason);
    }

    pub fn close(&self) {
        self.peer.close();
    }
}

pub fn directory(nodes: &[(u32, &str)]) -> WireMessage {
    WireMessage::DirectoryResponse(DirectoryReply {
        nodes: nodes
            .iter()
            .map(|(id, name)| NodeEntry {
                id: *id,
                name: name.to_string(),
            })
            .collect(),
    })
}

pub fn event_batch(events: &[(f64, &str, u32)]) -> WireMessage {
    WireMessage::EventQueryResponse(EventQueryReply {
        events: events
            .iter()
            .map(|(t, sender, code)| EventRecord {
                timestamp: *t,
                sender: sender.to_string(),
                code: *code,
                status: 0,
                message: format!("event {} from {}", code, sender),
            })
            .collect(),
    })
}

pub fn sender_tags(sender: &str, tags: &[(&str, &str)]) -> WireMessage {
    WireMessage::SenderTagResponse(SenderTagReply {
        sender: sender.to_string(),
        tags: tags
            .iter()
            .map(|(name, value)| TagEntry {
                name: name.to_string(),
                value: value.to_string(),
                source: "config".to_string(),
            })
            .collect(),
    })
}
