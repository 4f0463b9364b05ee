//! # Engine Task
//!
//! One tokio task owns every piece of mutable client state: the correlation
//! registry, the request queue, the time synchronizer, the node directory and
//! the sender-tag cache. Callers reach it through [`Command`]s; the transport
//! reaches it through [`EngineEvent`]s. Both arrive on channels consumed by a
//! single `select!` loop, so each command or event is handled to completion
//! before the next one starts.
//!
//! Connection lifecycle:
//! 1. `connect()` bumps the connection generation and spawns the connector.
//!    Events that carry an older generation are ignored.
//! 2. On open the link's inbound channel is pumped into the event channel and,
//!    with time sync enabled, a synchronization cycle starts. Requests stay
//!    queued until that first cycle completes.
//! 3. On error or close everything outstanding is failed and the queue is
//!    discarded.
//! 4. After a close with auto-reconnect a new attempt is scheduled; requests
//!    issued meanwhile are queued for it. Without auto-reconnect the client
//!    becomes terminally closed.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::clock::Clock;
use super::lookups::{NodeDirectory, SenderTags, TagLookup, TagWaiter};
use super::registry::{Registry, RequestId};
use super::request_queue::RequestQueue;
use super::time_sync::{SyncProgress, TimeSync};
use crate::configs::ClientConfig;
use crate::error::{HistorianError, Result};
use crate::protocol::envelope::{EventFilter, SenderTagRequestBody, TimeseriesRequestBody};
use crate::protocol::{
    EnvelopeCodec, Event, EventQuery, Frame, Node, Sample, Series, ServerVersion, TimeRange, WireMessage,
    MINIMUM_SERVER_VERSION,
};
use crate::transport::{Connector, Link, Outbound, TransportEvent};

/// State of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// A fully formed request, ready to be written or queued.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Request {
    Version,
    Directory,
    TimeRange,
    Timeseries {
        /// Resolved `(id, name)` pairs in request order.
        nodes: Vec<(u32, String)>,
        start: f64,
        end: f64,
        max_points: Option<u32>,
    },
    Events(EventQuery),
    EventCount(EventQuery),
    SenderTags(String),
}

impl Request {
    /// Wire form of the request. Client timestamps are moved to the server clock.
    pub(crate) fn to_wire(&self, sync: &TimeSync) -> WireMessage {
        match self {
            Request::Version => WireMessage::VersionRequest,
            Request::Directory => WireMessage::DirectoryRequest,
            Request::TimeRange => WireMessage::TimeRangeRequest,
            Request::Timeseries {
                nodes,
                start,
                end,
                max_points,
            } => WireMessage::TimeseriesRequest(TimeseriesRequestBody {
                node_ids: nodes.iter().map(|(id, _)| *id).collect(),
                start: sync.to_server(*start),
                end: sync.to_server(*end),
                max_points: *max_points,
            }),
            Request::Events(query) => WireMessage::EventQueryRequest(event_filter(query, sync)),
            Request::EventCount(query) => WireMessage::EventCountRequest(event_filter(query, sync)),
            Request::SenderTags(sender) => WireMessage::SenderTagRequest(SenderTagRequestBody {
                sender: sender.clone(),
            }),
        }
    }

    fn expect(&self) -> Expect {
        match self {
            Request::Version => Expect::Version,
            Request::Directory => Expect::Directory,
            Request::TimeRange => Expect::TimeRange,
            Request::Timeseries { nodes, .. } => Expect::Timeseries(nodes.clone()),
            Request::Events(_) => Expect::Events,
            Request::EventCount(_) => Expect::EventCount,
            // Tag lookups are parked as `Waiter::Tags`, never as callers.
            Request::SenderTags(_) => Expect::SenderTags,
        }
    }
}

fn event_filter(query: &EventQuery, sync: &TimeSync) -> EventFilter {
    EventFilter {
        start: sync.to_server(query.start),
        end: sync.to_server(query.end),
        senders: query.senders.clone(),
        codes: query.codes.clone(),
        status_mask: query.status_mask,
        limit: query.limit,
    }
}

/// Decoded answer handed back to a caller.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    Version(ServerVersion),
    Directory(Vec<Node>),
    TimeRange(TimeRange),
    Timeseries(Vec<Series>),
    Events(Vec<Event>),
    EventCount(u64),
}

pub(crate) type ReplyTx = oneshot::Sender<Result<Reply>>;

/// What a caller expects back, with whatever is needed to build the reply.
#[derive(Debug, Clone, PartialEq)]
enum Expect {
    Version,
    Directory,
    TimeRange,
    Timeseries(Vec<(u32, String)>),
    Events,
    EventCount,
    SenderTags,
}

impl Expect {
    fn name(&self) -> &'static str {
        match self {
            Expect::Version => "version",
            Expect::Directory => "directory",
            Expect::TimeRange => "time range",
            Expect::Timeseries(_) => "timeseries",
            Expect::Events => "event query",
            Expect::EventCount => "event count",
            Expect::SenderTags => "sender tag",
        }
    }
}

/// Whatever is waiting on an outstanding request id.
enum Waiter {
    Caller { expect: Expect, reply: ReplyTx },
    Probe,
    Tags { sender: String },
}

/// Requests from `Client` handles.
pub(crate) enum Command {
    Submit { request: Request, reply: ReplyTx },
    SenderTags { sender: String, reply: TagWaiter },
    Directory { reply: oneshot::Sender<NodeDirectory> },
    SetTimeSync { enabled: bool, reply: oneshot::Sender<()> },
    ClockOffset { reply: oneshot::Sender<f64> },
    State { reply: oneshot::Sender<ConnectionState> },
    Disconnect { reply: oneshot::Sender<()> },
}

/// Things that happen to the connection.
pub(crate) enum EngineEvent {
    Opened { generation: u64, link: Link },
    ConnectFailed { generation: u64, reason: String },
    Transport { generation: u64, event: TransportEvent },
    ReconnectDue { generation: u64 },
}

pub(crate) struct Engine {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    codec: Arc<dyn EnvelopeCodec>,
    clock: Arc<dyn Clock>,

    state: ConnectionState,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    auto_reconnect: bool,
    terminal: bool,
    reconnect_attempts: u32,

    registry: Registry<Waiter>,
    queue: RequestQueue<Request>,
    sync: TimeSync,
    directory: NodeDirectory,
    tags: SenderTags,

    events_tx: mpsc::UnboundedSender<EngineEvent>,
}

impl Engine {
    /// Spawns the engine task and returns its command channel. Must be called
    /// from within a tokio runtime.
    pub(crate) fn spawn(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        codec: Arc<dyn EnvelopeCodec>,
        clock: Arc<dyn Clock>,
    ) -> mpsc::UnboundedSender<Command> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sync = TimeSync::new(
            config.time_sync,
            config.sync_samples,
            config.resync_interval.as_secs_f64(),
        );
        let engine = Engine {
            auto_reconnect: config.auto_reconnect,
            config,
            connector,
            codec,
            clock,
            state: ConnectionState::Connecting,
            generation: 0,
            outbound: None,
            terminal: false,
            reconnect_attempts: 0,
            registry: Registry::new(),
            queue: RequestQueue::new(),
            sync,
            directory: NodeDirectory::new(),
            tags: SenderTags::new(),
            events_tx,
        };
        tokio::spawn(engine.run(cmd_rx, events_rx));
        cmd_tx
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<EngineEvent>,
    ) {
        self.connect();
        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_command(cmd),
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event),
            }
        }
        log::debug!("All client handles dropped, stopping historian engine");
        self.shutdown();
    }

    // --- connection lifecycle -------------------------------------------

    fn connect(&mut self) {
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        let generation = self.generation;
        log::info!("Connecting to historian at {}", self.config.url);

        let connecting = self.connector.connect(&self.config.url);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match connecting.await {
                Ok(link) => EngineEvent::Opened { generation, link },
                Err(e) => EngineEvent::ConnectFailed {
                    generation,
                    reason: e.to_string(),
                },
            };
            let _ = events.send(event);
        });
    }

    fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Opened { generation, link } => self.on_opened(generation, link),
            EngineEvent::ConnectFailed { generation, reason } => {
                if generation != self.generation {
                    return;
                }
                log::error!("Failed to connect to historian: {}", reason);
                self.on_error(&reason);
                self.on_closed();
            }
            EngineEvent::Transport { generation, event } => {
                if generation != self.generation {
                    log::trace!("Ignoring event from stale connection {}", generation);
                    return;
                }
                match event {
                    TransportEvent::Message(bytes) => self.on_message(&bytes),
                    TransportEvent::Error(reason) => {
                        log::error!("Historian connection error: {}", reason);
                        self.on_error(&reason);
                    }
                    TransportEvent::Closed => self.on_closed(),
                }
            }
            EngineEvent::ReconnectDue { generation } => {
                if generation == self.generation && self.auto_reconnect && !self.terminal {
                    self.connect();
                }
            }
        }
    }

    fn on_opened(&mut self, generation: u64, link: Link) {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            log::debug!("Discarding connection that opened after it was abandoned");
            let _ = link.outbound.send(Outbound::Close);
            return;
        }
        log::info!("Connected to historian at {}", self.config.url);
        self.state = ConnectionState::Open;
        self.reconnect_attempts = 0;
        self.outbound = Some(link.outbound);

        let events = self.events_tx.clone();
        let mut inbound = link.inbound;
        tokio::spawn(async move {
            while let Some(event) = inbound.recv().await {
                if events.send(EngineEvent::Transport { generation, event }).is_err() {
                    return;
                }
            }
            // The transport dropped its sender without reporting a close.
            let _ = events.send(EngineEvent::Transport {
                generation,
                event: TransportEvent::Closed,
            });
        });

        self.sync.connection_opened();
        if self.sync.is_enabled() {
            self.start_sync_cycle();
        } else {
            self.flush_queue();
        }
    }

    fn on_error(&mut self, reason: &str) {
        self.sweep(&HistorianError::Connection(reason.to_string()));
    }

    fn on_closed(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        self.state = ConnectionState::Closed;
        self.outbound = None;
        // Queued and written requests alike; only later requests see the new connection.
        self.sweep(&HistorianError::Connection("connection closed".to_string()));

        if !self.auto_reconnect {
            log::info!("Historian connection closed");
            self.terminal = true;
            return;
        }

        if let Some(max) = self.config.reconnect_max_attempts {
            if self.reconnect_attempts >= max {
                log::error!("Giving up on historian after {} reconnect attempts", max);
                self.terminal = true;
                return;
            }
        }

        let delay = self.config.reconnect_delay_for(self.reconnect_attempts);
        self.reconnect_attempts += 1;
        log::warn!("Historian connection closed, reconnecting in {:?}", delay);
        let generation = self.generation;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(EngineEvent::ReconnectDue { generation });
        });
    }

    /// Fails every outstanding request, drops the queue and the pending tag
    /// lookups.
    fn sweep(&mut self, error: &HistorianError) {
        let failed = self.registry.fail_all();
        let discarded = self.queue.drain().len();
        if !failed.is_empty() {
            log::warn!(
                "Failing {} outstanding request(s), {} of them queued: {}",
                failed.len(),
                discarded,
                error
            );
        }
        for (_, waiter) in failed {
            self.reject(waiter, error.clone());
        }
        self.tags.fail_all(error);
        self.sync.connection_lost();
    }

    fn shutdown(&mut self) {
        self.auto_reconnect = false;
        self.terminal = true;
        self.sweep(&HistorianError::Shutdown);
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outbound::Close);
        }
        self.state = ConnectionState::Closed;
    }

    // --- commands ---------------------------------------------------------

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Submit { request, reply } => {
                if self.terminal {
                    let _ = reply.send(Err(disconnected()));
                    return;
                }
                if let Some(cap) = self.config.max_outstanding {
                    if self.outstanding() >= cap {
                        log::warn!("Rejecting request: {} requests outstanding", cap);
                        let _ = reply.send(Err(HistorianError::Overloaded(cap)));
                        return;
                    }
                }
                let expect = request.expect();
                self.submit(request, Waiter::Caller { expect, reply });
            }
            Command::SenderTags { sender, reply } => match self.tags.request(&sender, reply) {
                TagLookup::Cached | TagLookup::Joined => {}
                TagLookup::Start if self.terminal => self.tags.fail(&sender, &disconnected()),
                TagLookup::Start => {
                    log::debug!("Looking up tags of sender '{}'", sender);
                    self.submit(Request::SenderTags(sender.clone()), Waiter::Tags { sender });
                }
            },
            Command::Directory { reply } => {
                let _ = reply.send(self.directory.clone());
            }
            Command::SetTimeSync { enabled, reply } => {
                self.set_time_sync(enabled);
                let _ = reply.send(());
            }
            Command::ClockOffset { reply } => {
                let offset = if self.sync.is_enabled() { self.sync.offset() } else { 0.0 };
                let _ = reply.send(offset);
            }
            Command::State { reply } => {
                let _ = reply.send(self.state);
            }
            Command::Disconnect { reply } => {
                self.disconnect();
                let _ = reply.send(());
            }
        }
    }

    fn disconnect(&mut self) {
        if self.terminal {
            log::debug!("Historian client already disconnected");
            return;
        }
        log::info!("Disconnecting from historian");
        self.auto_reconnect = false;
        self.terminal = true;
        self.sweep(&HistorianError::Connection("disconnected by client".to_string()));
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outbound::Close);
        }
        // Late events from this connection (its close, a pending reconnect)
        // must not touch the terminal state.
        self.generation += 1;
        self.state = ConnectionState::Closed;
    }

    fn set_time_sync(&mut self, enabled: bool) {
        if let Some(probe) = self.sync.set_enabled(enabled) {
            self.registry.settle(probe);
            log::info!("Dropped clock probe {}: {}", probe, HistorianError::SyncDisabled);
        }
        // Once enabled, the next dispatched request starts a fresh cycle.
        if !enabled && self.state == ConnectionState::Open {
            self.flush_queue();
        }
    }

    // --- requests ---------------------------------------------------------

    fn outstanding(&self) -> usize {
        let probes = usize::from(self.sync.probe_in_flight().is_some());
        self.registry.len().saturating_sub(probes)
    }

    fn is_ready(&self) -> bool {
        self.state == ConnectionState::Open && !self.sync.blocks_requests()
    }

    fn submit(&mut self, request: Request, waiter: Waiter) {
        let id = self.registry.allocate();
        self.registry.register(id, waiter);
        if self.is_ready() {
            self.dispatch(id, request);
        } else {
            log::debug!("Queueing request {} until the connection is ready", id);
            self.queue.push(id, request);
        }
    }

    fn flush_queue(&mut self) {
        let queued = self.queue.drain();
        if queued.is_empty() {
            return;
        }
        log::debug!("Replaying {} queued request(s)", queued.len());
        for (id, request) in queued {
            if self.registry.contains(id) {
                self.dispatch(id, request);
            }
        }
    }

    fn dispatch(&mut self, id: RequestId, request: Request) {
        if self.sync.is_due(self.clock.now()) {
            self.start_sync_cycle();
        }
        let frame = Frame::new(id, request.to_wire(&self.sync));
        if let Err(e) = self.write(&frame) {
            log::error!("Failed to send request {}: {}", id, e);
            if let Some(waiter) = self.registry.settle(id) {
                self.reject(waiter, e);
            }
        }
    }

    fn write(&self, frame: &Frame) -> Result<()> {
        let bytes = self.codec.encode(frame)?;
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| HistorianError::Connection("not connected".to_string()))?;
        log::trace!("Sending {:?} {} ({} bytes)", frame.message.kind(), frame.request_id, bytes.len());
        outbound
            .send(Outbound::Frame(bytes))
            .map_err(|_| HistorianError::Connection("connection lost".to_string()))
    }

    fn reject(&mut self, waiter: Waiter, error: HistorianError) {
        match waiter {
            Waiter::Caller { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            Waiter::Tags { sender } => self.tags.fail(&sender, &error),
            Waiter::Probe => {}
        }
    }

    // --- time synchronization -----------------------------------------------

    fn start_sync_cycle(&mut self) {
        log::debug!("Starting clock synchronization cycle");
        self.sync.start_cycle(self.clock.now());
        self.send_probe();
    }

    fn send_probe(&mut self) {
        let id = self.registry.allocate();
        self.registry.register(id, Waiter::Probe);
        self.sync.begin_probe(id, self.clock.now());
        if let Err(e) = self.write(&Frame::new(id, WireMessage::TimeProbeRequest)) {
            log::warn!("Failed to send clock probe {}: {}", id, e);
            self.registry.settle(id);
            self.give_up_sync(id);
        }
    }

    fn on_probe_reply(&mut self, id: RequestId, message: WireMessage) {
        match message {
            WireMessage::TimeProbeResponse(reply) => {
                match self.sync.record(id, reply.timestamp_ns, self.clock.now()) {
                    SyncProgress::Ignored => log::debug!("Ignoring answer to abandoned clock probe {}", id),
                    SyncProgress::NeedMore => self.send_probe(),
                    SyncProgress::Complete {
                        offset,
                        first_on_connection,
                    } => {
                        log::info!("Clock synchronized, offset {:.6}s", offset);
                        if first_on_connection {
                            self.flush_queue();
                        }
                    }
                }
            }
            WireMessage::Error(err) => {
                log::warn!("Clock probe {} rejected by server: {}", id, err.message);
                self.give_up_sync(id);
            }
            other => {
                log::warn!("Unexpected {:?} answer to clock probe {}", other.kind(), id);
                self.give_up_sync(id);
            }
        }
    }

    fn give_up_sync(&mut self, id: RequestId) {
        if let Some(first_on_connection) = self.sync.give_up_cycle(id) {
            log::warn!("Clock synchronization cycle abandoned, offset stays {:.6}s", self.sync.offset());
            if first_on_connection {
                self.flush_queue();
            }
        }
    }

    // --- responses ----------------------------------------------------------

    fn on_message(&mut self, bytes: &[u8]) {
        let frame = match self.codec.decode(bytes) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping undecodable frame ({} bytes): {}", bytes.len(), e);
                return;
            }
        };
        let id = frame.request_id;
        log::trace!("Received {:?} {}", frame.message.kind(), id);
        let Some(waiter) = self.registry.settle(id) else {
            log::debug!("Dropping {:?} for unknown request {}", frame.message.kind(), id);
            return;
        };
        match waiter {
            Waiter::Probe => self.on_probe_reply(id, frame.message),
            Waiter::Tags { sender } => match frame.message {
                WireMessage::SenderTagResponse(reply) => {
                    let tags = self.tags.complete(&sender, &reply);
                    log::debug!("Cached {} tag(s) of sender '{}'", tags.len(), sender);
                }
                other => {
                    let error = self.unexpected_or_server(&Expect::SenderTags, other);
                    self.tags.fail(&sender, &error);
                }
            },
            Waiter::Caller { expect, reply } => {
                let result = self.build_reply(expect, frame.message);
                let _ = reply.send(result);
            }
        }
    }

    fn build_reply(&mut self, expect: Expect, message: WireMessage) -> Result<Reply> {
        match (expect, message) {
            (Expect::Version, WireMessage::VersionResponse(v)) => {
                let found = ServerVersion::new(v.major, v.minor, v.patch);
                if found < MINIMUM_SERVER_VERSION {
                    return Err(HistorianError::IncompatibleVersion {
                        found,
                        minimum: MINIMUM_SERVER_VERSION,
                    });
                }
                Ok(Reply::Version(found))
            }
            (Expect::Directory, WireMessage::DirectoryResponse(listing)) => {
                self.directory.replace(&listing);
                log::debug!("Node directory replaced, {} node(s)", self.directory.len());
                Ok(Reply::Directory(
                    listing
                        .nodes
                        .into_iter()
                        .map(|n| Node { id: n.id, name: n.name })
                        .collect(),
                ))
            }
            (Expect::TimeRange, WireMessage::TimeRangeResponse(range)) => Ok(Reply::TimeRange(TimeRange {
                start: self.sync.to_client(range.min),
                end: self.sync.to_client(range.max),
            })),
            (Expect::Timeseries(nodes), WireMessage::TimeseriesResponse(data)) => {
                let series = data
                    .series
                    .into_iter()
                    .map(|entry| Series {
                        node: nodes
                            .iter()
                            .find(|(id, _)| *id == entry.node_id)
                            .map(|(_, name)| name.clone())
                            .or_else(|| self.directory.name_of(entry.node_id).map(str::to_string))
                            .unwrap_or_else(|| entry.node_id.to_string()),
                        samples: entry
                            .points
                            .into_iter()
                            .map(|p| Sample {
                                time: self.sync.to_client(p.timestamp),
                                value: p.value,
                            })
                            .collect(),
                    })
                    .collect();
                Ok(Reply::Timeseries(series))
            }
            (Expect::Events, WireMessage::EventQueryResponse(batch)) => Ok(Reply::Events(
                batch
                    .events
                    .into_iter()
                    .map(|e| Event {
                        time: self.sync.to_client(e.timestamp),
                        sender: e.sender,
                        code: e.code,
                        status: e.status,
                        message: e.message,
                        tags: None,
                    })
                    .collect(),
            )),
            (Expect::EventCount, WireMessage::EventCountResponse(count)) => Ok(Reply::EventCount(count.count)),
            (expect, other) => Err(self.unexpected_or_server(&expect, other)),
        }
    }

    fn unexpected_or_server(&self, expect: &Expect, message: WireMessage) -> HistorianError {
        match message {
            WireMessage::Error(err) => HistorianError::Server(err.message),
            other => HistorianError::UnexpectedResponse {
                expected: expect.name().to_string(),
                got: format!("{:?}", other.kind()),
            },
        }
    }
}

fn disconnected() -> HistorianError {
    HistorianError::Connection("client is disconnected".to_string())
}
