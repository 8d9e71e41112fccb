//! Tracing subscriber setup.
//!
//! Precedence: `RUST_LOG` environment variable > `--log-level`-derived
//! default. With `--log-file` the subscriber writes through a non-blocking
//! appender; the returned guard must live for the whole process so the
//! last lines are flushed on exit.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Keeps the file appender's worker alive. Hold it in `main`.
pub struct LogGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init(config: &Config) -> Result<LogGuard> {
    let default_filter = format!("filedex={}", config.log_level.as_filter());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    match &config.log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false),
                )
                .init();
            Ok(LogGuard { _file: Some(guard) })
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
            Ok(LogGuard { _file: None })
        }
    }
}
