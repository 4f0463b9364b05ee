//! # lib_historian
//!
//! Asynchronous client for a historian/logging service reached over one
//! persistent WebSocket connection carrying protobuf envelopes.
//!
//! The client multiplexes concurrent requests by correlation id, keeps the
//! local and server clocks reconciled, queues requests until the connection
//! is ready and resolves node names and sender tags on the caller's behalf.
//!
//! ```no_run
//! use lib_historian::{Client, EventQuery};
//!
//! # async fn demo() -> lib_historian::Result<()> {
//! let client = Client::connect("ws://historian.local:8080/")?;
//! let version = client.version().await?;
//! let events = client.events(EventQuery::new(1_700_000_000.0, 1_700_003_600.0)).await?;
//! println!("server {} returned {} events", version, events.len());
//! client.disconnect().await?;
//! # Ok(())
//! # }
//! ```

pub mod configs;
pub mod core;
pub mod error;
#[cfg(feature = "loggers")]
pub mod loggers;
pub mod protocol;
pub mod transport;

pub use configs::{load_config, ClientConfig, ClientOptions};
pub use crate::core::{Client, ClientBuilder, Clock, ConnectionState, SystemClock};
pub use error::{HistorianError, Result};
pub use protocol::{
    Event, EventQuery, Node, Sample, Series, ServerVersion, TagSet, TagValue, TimeRange, TimeseriesQuery,
    MINIMUM_SERVER_VERSION,
};
