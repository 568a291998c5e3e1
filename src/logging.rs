//! Logging Setup
//!
//! `tracing` subscriber wiring for the binary. The interactive wizard owns
//! the terminal, so it never logs to the console: debug mode writes daily
//! rolling files under `.stepwise/logs/`, and a configured log file gets
//! everything at the configured level.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_PREFIX: &str = "stepwise";
const LOG_SUFFIX: &str = "log";

/// Logging options, built from CLI flags and configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    debug_mode: bool,
    log_dir: PathBuf,
    level: String,
    file: Option<PathBuf>,
    console: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            debug_mode: false,
            log_dir: default_log_dir(),
            level: "info".to_string(),
            file: None,
            console: false,
        }
    }

    /// Debug mode: rolling files in the log directory at `debug` level.
    pub fn with_debug_mode(mut self, debug: bool) -> Self {
        self.debug_mode = debug;
        self
    }

    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = dir;
        self
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Append to a single file (from `logging.file` in config).
    pub fn with_file(mut self, file: Option<PathBuf>) -> Self {
        self.file = file;
        self
    }

    /// Also log warnings to stderr. Only for commands that don't take
    /// over the terminal.
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    fn filter(&self) -> EnvFilter {
        let level = if self.debug_mode { "debug" } else { self.level.as_str() };
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), level)))
    }
}

/// Install the global subscriber.
///
/// Returns the appender guards; keep them alive until exit so buffered
/// lines are flushed.
pub fn init_logging(config: LogConfig) -> Result<Vec<WorkerGuard>> {
    let mut guards = Vec::new();
    let mut layers = Vec::new();

    if config.debug_mode {
        fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", config.log_dir.display())
        })?;
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(LOG_PREFIX)
            .filename_suffix(LOG_SUFFIX)
            .build(&config.log_dir)
            .context("Failed to create rolling log appender")?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_filter(config.filter())
                .boxed(),
        );
    }

    if let Some(file) = &config.file {
        let dir = file.parent().filter(|p| !p.as_os_str().is_empty());
        let dir = dir.unwrap_or_else(|| Path::new("."));
        let name = file
            .file_name()
            .with_context(|| format!("Log file has no name: {}", file.display()))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
        guards.push(guard);
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(config.filter())
                .boxed(),
        );
    }

    if config.console {
        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_filter(EnvFilter::new("warn"))
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if config.debug_mode {
        tracing::debug!("Debug logging to {}", config.log_dir.display());
    }
    Ok(guards)
}

/// `.stepwise/logs` under the working directory
pub fn default_log_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".stepwise")
        .join("logs")
}

/// Most recently modified log file in the default directory.
pub fn get_log_path() -> Option<PathBuf> {
    newest_log_in(&default_log_dir())
}

/// Delete log files older than `days`. Returns how many were removed.
pub fn cleanup_old_logs(days: u64) -> Result<usize> {
    cleanup_logs_in(&default_log_dir(), days)
}

/// Log files in `dir`: (path, size, modified)
pub fn list_logs(dir: &Path) -> Vec<(PathBuf, u64, SystemTime)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| is_log_file(&entry.path()))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            Some((entry.path(), metadata.len(), metadata.modified().ok()?))
        })
        .collect()
}

fn newest_log_in(dir: &Path) -> Option<PathBuf> {
    list_logs(dir)
        .into_iter()
        .max_by_key(|(_, _, modified)| *modified)
        .map(|(path, _, _)| path)
}

fn cleanup_logs_in(dir: &Path, days: u64) -> Result<usize> {
    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(days * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    for (path, _, modified) in list_logs(dir) {
        if modified < cutoff {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove log file: {}", path.display()))?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_log_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == LOG_SUFFIX)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::new()
            .with_debug_mode(true)
            .with_log_dir(PathBuf::from("/tmp/stepwise-logs"))
            .with_level("warn");
        assert!(config.debug_mode);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/stepwise-logs"));
        assert_eq!(config.level, "warn");
        assert!(!config.console);
    }

    #[test]
    fn test_default_log_dir() {
        assert!(default_log_dir().ends_with(".stepwise/logs"));
    }

    #[test]
    fn test_is_log_file() {
        assert!(is_log_file(Path::new("stepwise.2026-10-19.log")));
        assert!(!is_log_file(Path::new("stepwise.2026-10-19.txt")));
        assert!(!is_log_file(Path::new("other.log")));
    }

    #[test]
    fn test_recent_logs_survive_cleanup() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stepwise.2026-10-19.log"), "line\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(cleanup_logs_in(dir.path(), 7).unwrap(), 0);
        assert_eq!(list_logs(dir.path()).len(), 1);
        assert_eq!(
            newest_log_in(dir.path()).unwrap(),
            dir.path().join("stepwise.2026-10-19.log")
        );
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_logs(&missing).is_empty());
        assert!(newest_log_in(&missing).is_none());
        assert_eq!(cleanup_logs_in(&missing, 1).unwrap(), 0);
    }
}
