/// Console and file logging through fern, with log rotation on startup.
pub mod logger_file;

pub use logger_file::{cleanup_old_logs, setup_logging};
