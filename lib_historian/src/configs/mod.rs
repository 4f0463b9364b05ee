//! # Configuration Modules
//!
//! Layered client configuration: built-in defaults, an optional JSON file and
//! `HISTORIAN_*` environment variables.

/// Client options, their merge rules and the resolved configuration.
pub mod config_client;

pub use config_client::{load_config, ClientConfig, ClientOptions};
