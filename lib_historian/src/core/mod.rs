//! # Core Engine Modules
//!
//! The request/response engine, bottom-up:
//!
//! - **`registry`**: request ids and the waiters parked under them.
//! - **`request_queue`**: requests held back until the connection is ready.
//! - **`time_sync`**: round-trip clock offset estimation.
//! - **`lookups`**: node directory and sender-tag cache.
//! - **`clock`**: injectable local time.
//! - **`engine`**: the task that owns all of the above and the connection.
//! - **`client`**: the cloneable handle callers use.

pub mod clock;
pub mod client;
pub mod engine;
pub mod lookups;
pub mod registry;
pub mod request_queue;
pub mod time_sync;

pub use client::{Client, ClientBuilder};
pub use clock::{Clock, SystemClock};
pub use engine::ConnectionState;
pub use lookups::NodeDirectory;
pub use registry::RequestId;
