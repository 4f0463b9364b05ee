use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "historian_client.json";

/// Partial configuration as found in a config file or the environment.
///
/// Every field is optional so layers can be merged; [`ClientOptions::resolve`]
/// fills the gaps with defaults.
#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    /// Historian WebSocket URL.
    pub url: Option<String>,
    /// Reconnect after an unrequested close.
    pub auto_reconnect: Option<bool>,
    /// Keep the client and server clocks reconciled.
    pub time_sync: Option<bool>,
    /// Delay before the first reconnect attempt.
    pub reconnect_delay_ms: Option<u64>,
    /// Cap for the doubling reconnect delay.
    pub reconnect_max_delay_ms: Option<u64>,
    /// Give up after this many consecutive failed reconnects.
    pub reconnect_max_attempts: Option<u32>,
    /// Probes per synchronization cycle.
    pub sync_samples: Option<usize>,
    /// Seconds after which an outgoing request triggers a new cycle.
    pub resync_interval_secs: Option<f64>,
    /// Reject requests beyond this many outstanding ones.
    pub max_outstanding: Option<usize>,
}

impl ClientOptions {
    // Merge two option sets, where 'other' overrides 'self' for Some values
    pub fn merge(self, other: ClientOptions) -> ClientOptions {
        ClientOptions {
            url: other.url.or(self.url),
            auto_reconnect: other.auto_reconnect.or(self.auto_reconnect),
            time_sync: other.time_sync.or(self.time_sync),
            reconnect_delay_ms: other.reconnect_delay_ms.or(self.reconnect_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            reconnect_max_attempts: other.reconnect_max_attempts.or(self.reconnect_max_attempts),
            sync_samples: other.sync_samples.or(self.sync_samples),
            resync_interval_secs: other.resync_interval_secs.or(self.resync_interval_secs),
            max_outstanding: other.max_outstanding.or(self.max_outstanding),
        }
    }

    /// Reads the `HISTORIAN_*` environment variables. Unparsable values are
    /// logged and ignored.
    pub fn from_env() -> ClientOptions {
        ClientOptions {
            url: env::var("HISTORIAN_URL").ok(),
            auto_reconnect: env_parsed("HISTORIAN_AUTO_RECONNECT"),
            time_sync: env_parsed("HISTORIAN_TIME_SYNC"),
            reconnect_delay_ms: env_parsed("HISTORIAN_RECONNECT_DELAY_MS"),
            reconnect_max_delay_ms: env_parsed("HISTORIAN_RECONNECT_MAX_DELAY_MS"),
            reconnect_max_attempts: env_parsed("HISTORIAN_RECONNECT_MAX_ATTEMPTS"),
            sync_samples: env_parsed("HISTORIAN_SYNC_SAMPLES"),
            resync_interval_secs: env_parsed("HISTORIAN_RESYNC_INTERVAL_SECS"),
            max_outstanding: env_parsed("HISTORIAN_MAX_OUTSTANDING"),
        }
    }

    /// Fills every unset field with its default.
    pub fn resolve(self) -> ClientConfig {
        let d = ClientConfig::default();
        let reconnect_delay = self
            .reconnect_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(d.reconnect_delay);
        // Without an explicit cap the delay stays fixed.
        let reconnect_max_delay = self
            .reconnect_max_delay_ms
            .map(Duration::from_millis)
            .unwrap_or(reconnect_delay)
            .max(reconnect_delay);
        ClientConfig {
            url: self.url.unwrap_or(d.url),
            auto_reconnect: self.auto_reconnect.unwrap_or(d.auto_reconnect),
            time_sync: self.time_sync.unwrap_or(d.time_sync),
            reconnect_delay,
            reconnect_max_delay,
            reconnect_max_attempts: self.reconnect_max_attempts.or(d.reconnect_max_attempts),
            sync_samples: self.sync_samples.unwrap_or(d.sync_samples).max(1),
            resync_interval: self
                .resync_interval_secs
                .map(Duration::from_secs_f64)
                .unwrap_or(d.resync_interval),
            max_outstanding: self.max_outstanding.or(d.max_outstanding),
        }
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {}: cannot parse '{}'", key, raw);
            None
        }
    }
}

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub url: String,
    pub auto_reconnect: bool,
    pub time_sync: bool,
    pub reconnect_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// `None` retries forever.
    pub reconnect_max_attempts: Option<u32>,
    pub sync_samples: usize,
    pub resync_interval: Duration,
    /// `None` means no cap.
    pub max_outstanding: Option<usize>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/".to_string(),
            auto_reconnect: true,
            time_sync: true,
            reconnect_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(1),
            reconnect_max_attempts: None,
            sync_samples: 3,
            resync_interval: Duration::from_secs(10),
            max_outstanding: None,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Delay before reconnect attempt number `attempt` (0-based): the base
    /// delay doubled per failed attempt, capped at `reconnect_max_delay`.
    pub fn reconnect_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(16)).unwrap_or(u32::MAX);
        self.reconnect_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}

/// Builds the configuration from defaults, an optional JSON file and the
/// environment (a `.env` file is loaded first).
///
/// The file defaults to `historian_client.json` in the working directory; a
/// missing or broken file is logged and skipped.
pub fn load_config(path: Option<&Path>) -> ClientConfig {
    let _ = dotenvy::dotenv();

    let config_file_path = path
        .map(Path::to_path_buf)
        .or_else(|| env::var("HISTORIAN_CONFIG_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut options = ClientOptions::default();

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<ClientOptions>(&config_str) {
                Ok(file_options) => options = options.merge(file_options),
                Err(e) => log::warn!(
                    "Failed to parse config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            },
            Err(e) => log::warn!(
                "Failed to read config file {}: {}. Falling back to other sources.",
                config_file_path.display(),
                e
            ),
        }
    } else {
        log::info!(
            "Config file not found at {}. Using defaults and environment variables.",
            config_file_path.display()
        );
    }

    options.merge(ClientOptions::from_env()).resolve()
}
