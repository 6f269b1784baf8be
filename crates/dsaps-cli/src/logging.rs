//! Log setup: compact lines on stderr plus a JSON log file per run.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Keeps the file writer alive; dropping it flushes the log.
pub struct LogGuard {
    pub path: PathBuf,
    _guard: WorkerGuard,
}

/// `log-<UTC timestamp>.log`.
fn log_file_name() -> String {
    format!("log-{}.log", Utc::now().format("%Y-%m-%dT%H:%M:%S"))
}

/// Install the global subscriber. `RUST_LOG` overrides the level.
pub fn init(log_dir: &Path, debug: bool) -> Result<LogGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    let file_name = log_file_name();
    let appender = tracing_appender::rolling::never(log_dir, &file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,dsaps={level},dsaps_core={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(fmt::layer().json().with_writer(file_writer))
        .try_init()
        .context("logging already initialised")?;

    Ok(LogGuard {
        path: log_dir.join(file_name),
        _guard: guard,
    })
}
