//! # Client Handle
//!
//! [`Client`] is the caller-facing surface. It is a cheap, cloneable handle
//! around the engine's command channel; every method returns a future that
//! resolves once the engine has settled the request.
//!
//! Two operations need a dependent lookup before they can finish:
//! - `timeseries` resolves node names through the node directory, refreshing
//!   it at most once when a name is unknown.
//! - `events` enriches the returned batch with sender tags, waiting for every
//!   distinct sender lookup before resolving.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot};

use super::clock::{Clock, SystemClock};
use super::engine::{Command, ConnectionState, Engine, Reply, Request};
use super::lookups::NodeDirectory;
use crate::configs::ClientConfig;
use crate::error::{HistorianError, Result};
use crate::protocol::{
    EnvelopeCodec, Event, EventQuery, Node, ProstCodec, Series, ServerVersion, TagSet, TimeRange, TimeseriesQuery,
};
use crate::transport::Connector;

/// Configures and starts a [`Client`].
pub struct ClientBuilder {
    config: ClientConfig,
    connector: Option<Arc<dyn Connector>>,
    codec: Arc<dyn EnvelopeCodec>,
    clock: Arc<dyn Clock>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            connector: None,
            codec: Arc::new(ProstCodec),
            clock: Arc::new(SystemClock),
        }
    }

    /// Transport used to reach the server. Defaults to [`crate::transport::WsConnector`]
    /// when the `ws` feature is enabled.
    pub fn connector(mut self, connector: impl Connector) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub fn codec(mut self, codec: impl EnvelopeCodec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    pub fn clock(mut self, clock: impl Clock) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Spawns the engine and starts connecting in the background. Requests
    /// made before the connection is ready are queued.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(self) -> Result<Client> {
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector()?,
        };
        let commands = Engine::spawn(self.config, connector, self.codec, self.clock);
        Ok(Client { commands })
    }
}

#[cfg(feature = "ws")]
fn default_connector() -> Result<Arc<dyn Connector>> {
    Ok(Arc::new(crate::transport::WsConnector))
}

#[cfg(not(feature = "ws"))]
fn default_connector() -> Result<Arc<dyn Connector>> {
    Err(HistorianError::Connection(
        "no transport configured; enable the 'ws' feature or set a connector".to_string(),
    ))
}

/// Handle to one historian connection. Clones share the connection; the
/// engine stops once every clone is dropped.
#[derive(Clone)]
pub struct Client {
    commands: mpsc::UnboundedSender<Command>,
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Connects to `url` over WebSocket with default settings.
    #[cfg(feature = "ws")]
    pub fn connect(url: impl Into<String>) -> Result<Client> {
        ClientBuilder::new(ClientConfig::new(url)).connect()
    }

    /// Server version. Versions older than
    /// [`crate::protocol::MINIMUM_SERVER_VERSION`] are rejected with
    /// [`HistorianError::IncompatibleVersion`].
    pub async fn version(&self) -> Result<ServerVersion> {
        match self.call(Request::Version).await? {
            Reply::Version(v) => Ok(v),
            other => Err(mismatch("version", other)),
        }
    }

    /// Lists every node. The client's directory is replaced by the answer.
    pub async fn list_nodes(&self) -> Result<Vec<Node>> {
        match self.call(Request::Directory).await? {
            Reply::Directory(nodes) => Ok(nodes),
            other => Err(mismatch("directory", other)),
        }
    }

    /// Oldest and newest stored timestamps, in client time.
    pub async fn time_range(&self) -> Result<TimeRange> {
        match self.call(Request::TimeRange).await? {
            Reply::TimeRange(range) => Ok(range),
            other => Err(mismatch("time range", other)),
        }
    }

    /// Samples of the named nodes over `[start, end]`.
    ///
    /// Unknown names trigger exactly one directory refresh; a name that is
    /// still unknown afterwards fails with [`HistorianError::UnknownNode`].
    pub async fn timeseries(&self, query: TimeseriesQuery) -> Result<Vec<Series>> {
        query.validate()?;
        let names = query.distinct_nodes();

        let mut directory = self.directory().await?;
        if let Some(missing) = directory.first_missing(&names) {
            log::debug!("Node '{}' not in directory, refreshing", missing);
            self.list_nodes().await?;
            directory = self.directory().await?;
        }
        let ids = directory.resolve(&names).map_err(HistorianError::UnknownNode)?;

        let request = Request::Timeseries {
            nodes: ids.into_iter().zip(names).collect(),
            start: query.start,
            end: query.end,
            max_points: query.max_points,
        };
        match self.call(request).await? {
            Reply::Timeseries(series) => Ok(series),
            other => Err(mismatch("timeseries", other)),
        }
    }

    /// Events matching `query`, each enriched with its sender's tags.
    ///
    /// Resolves after every distinct uncached sender has been looked up. A
    /// failed lookup leaves `tags` empty for that sender's events.
    pub async fn events(&self, query: EventQuery) -> Result<Vec<Event>> {
        query.validate()?;
        let mut events = match self.call(Request::Events(query)).await? {
            Reply::Events(events) => events,
            other => return Err(mismatch("event query", other)),
        };

        let senders: BTreeSet<String> = events.iter().map(|e| e.sender.clone()).collect();
        let lookups = join_all(senders.iter().map(|s| self.sender_tags(s))).await;
        let tags: HashMap<String, TagSet> = senders
            .into_iter()
            .zip(lookups)
            .filter_map(|(sender, result)| match result {
                Ok(tags) => Some((sender, tags)),
                Err(e) => {
                    log::warn!("Tag lookup for sender '{}' failed: {}", sender, e);
                    None
                }
            })
            .collect();

        for event in &mut events {
            event.tags = tags.get(&event.sender).cloned();
        }
        Ok(events)
    }

    /// Number of events matching `query`.
    pub async fn event_count(&self, query: EventQuery) -> Result<u64> {
        query.validate()?;
        match self.call(Request::EventCount(query)).await? {
            Reply::EventCount(n) => Ok(n),
            other => Err(mismatch("event count", other)),
        }
    }

    /// Tags of one event sender. Answers are cached for the client's
    /// lifetime; concurrent lookups of the same sender share one request.
    pub async fn sender_tags(&self, sender: &str) -> Result<TagSet> {
        if sender.trim().is_empty() {
            return Err(HistorianError::Validation("sender must not be empty".to_string()));
        }
        let (reply, rx) = oneshot::channel();
        self.send(Command::SenderTags {
            sender: sender.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| HistorianError::Shutdown)?
    }

    /// Switches clock synchronization on or off. Turning it off abandons a
    /// running cycle and releases requests waiting for it.
    pub async fn set_time_sync(&self, enabled: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SetTimeSync { enabled, reply })?;
        rx.await.map_err(|_| HistorianError::Shutdown)
    }

    /// Current `client - server` clock offset in seconds; zero while
    /// synchronization is off.
    pub async fn clock_offset(&self) -> Result<f64> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ClockOffset { reply })?;
        rx.await.map_err(|_| HistorianError::Shutdown)
    }

    pub async fn connection_state(&self) -> Result<ConnectionState> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::State { reply })?;
        rx.await.map_err(|_| HistorianError::Shutdown)
    }

    /// Closes the connection for good: no reconnect, outstanding and queued
    /// requests fail. Calling it again does nothing.
    pub async fn disconnect(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Disconnect { reply }).is_err() {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    async fn directory(&self) -> Result<NodeDirectory> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Directory { reply })?;
        rx.await.map_err(|_| HistorianError::Shutdown)
    }

    async fn call(&self, request: Request) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Submit { request, reply })?;
        rx.await.map_err(|_| HistorianError::Shutdown)?
    }

    fn send(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| HistorianError::Shutdown)
    }
}

fn mismatch(expected: &str, reply: Reply) -> HistorianError {
    HistorianError::UnexpectedResponse {
        expected: expected.to_string(),
        got: format!("{:?}", reply),
    }
}
