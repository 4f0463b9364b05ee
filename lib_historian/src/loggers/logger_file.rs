use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Routes the `log` facade to stdout and to a timestamped file in `log_dir`.
///
/// Older `.log` files in the directory are removed first. `log_level` is one
/// of `trace`, `debug`, `info`, `warn`, `error` (anything else means `info`).
/// Returns the path of the new log file.
pub fn setup_logging(log_dir: &Path, log_level: &str) -> Result<PathBuf> {
    if !log_dir.exists() {
        fs::create_dir_all(log_dir).with_context(|| format!("creating log directory {}", log_dir.display()))?;
    }

    cleanup_old_logs(log_dir)?;

    let log_file_name = format!(
        "historian_client_{}.log",
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = log_dir.join(log_file_name);

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%Y-%m-%d %H:%M:%S%.3f]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(parse_level(log_level))
        .chain(std::io::stdout())
        .chain(fern::log_file(&log_path)?)
        .apply()?;

    Ok(log_path)
}

fn parse_level(log_level: &str) -> log::LevelFilter {
    log::LevelFilter::from_str(log_level.trim()).unwrap_or(log::LevelFilter::Info)
}

/// Deletes every `.log` file in `log_dir` except the most recently modified one.
pub fn cleanup_old_logs(log_dir: &Path) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(log_dir)?
        .filter_map(|res| res.ok())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "log"))
        .filter_map(|e| {
            let modified = e.metadata().and_then(|m| m.modified()).ok()?;
            Some((modified, e.path()))
        })
        .collect();

    // Newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in entries.iter().skip(1) {
        if let Err(e) = fs::remove_file(path) {
            eprintln!("Failed to delete old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};

    fn touch(dir: &Path, name: &str, age_secs: u64) -> PathBuf {
        let path = dir.join(name);
        let file = File::create(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
        path
    }

    #[test]
    fn test_cleanup_keeps_newest_log_only() {
        let dir = tempfile::tempdir().unwrap();
        let oldest = touch(dir.path(), "a.log", 300);
        let newest = touch(dir.path(), "b.log", 10);
        let middle = touch(dir.path(), "c.log", 100);
        let other = touch(dir.path(), "notes.txt", 500);

        cleanup_old_logs(dir.path()).unwrap();

        assert!(newest.exists());
        assert!(!oldest.exists());
        assert!(!middle.exists());
        assert!(other.exists(), "non-log files are left alone");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("debug"), log::LevelFilter::Debug);
        assert_eq!(parse_level("TRACE"), log::LevelFilter::Trace);
        assert_eq!(parse_level("chatty"), log::LevelFilter::Info);
    }

    #[test]
    fn test_setup_creates_directory_and_file() {
        let root = tempfile::tempdir().unwrap();
        let log_dir = root.path().join("logs");
        let path = setup_logging(&log_dir, "debug").unwrap();
        log::info!("logging ready");
        assert!(log_dir.is_dir());
        assert!(path.exists());
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("historian_client_")));
    }
}
