//! Centralised tracing initialisation for the propagator binary.
//!
//! Call [`init_tracing`] once at program start. Later calls are ignored
//! because the global subscriber can only be set once per process.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Per-run log file name inside `dir`, e.g. `propagation_20250101_093000.log`.
pub fn run_log_path(dir: &Path, started: DateTime<Local>) -> PathBuf {
    dir.join(format!("propagation_{}.log", started.format("%Y%m%d_%H%M%S")))
}

/// Initialise the global tracing subscriber.
///
/// * `json`: emit newline-delimited JSON on stderr.
/// * `level`: default verbosity when `RUST_LOG` is not set.
/// * `log_file`: also append plain lines to this file, creating its
///   directory if needed.
///
/// Fails only when the log file cannot be opened.
pub fn init_tracing(json: bool, level: Level, log_file: Option<&Path>) -> std::io::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_log_path_format() {
        let started = Local.with_ymd_and_hms(2025, 3, 7, 9, 5, 1).unwrap();
        let path = run_log_path(Path::new("logs"), started);
        assert_eq!(path, PathBuf::from("logs/propagation_20250307_090501.log"));
    }

    #[test]
    fn test_init_creates_log_file_and_tolerates_repeat_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/run.log");
        init_tracing(false, Level::INFO, Some(&path)).unwrap();
        assert!(path.exists());
        init_tracing(true, Level::DEBUG, None).unwrap();
    }
}
