//! Tracing subscriber setup.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

/// Filter used when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_FILTER: &str = "taskboard=info,tower_http=info";

pub const LOG_FILE_PREFIX: &str = "taskboard.log";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LogConfig {
    /// Explicit filter directives. Takes precedence over `RUST_LOG`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    pub json: bool,
    /// Write to a daily-rolling file in this directory instead of stderr.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl LogConfig {
    pub fn env_filter(&self) -> Result<EnvFilter> {
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives)
                .with_context(|| format!("Invalid log filter '{}'", directives)),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
        }
    }
}

/// Install the global subscriber.
///
/// Returns the appender's guard when logging to a file; keep it alive for
/// the life of the process or buffered lines are lost.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = config.env_filter()?;

    let (writer, guard) = match &config.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.dir.is_none());

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    Ok(guard)
}
