//! Logging infrastructure.
//!
//! Every thread logs through `tracing`. The subscriber installed here fans
//! records out to:
//! - the configured log file, appended to through a non-blocking,
//!   internally synchronized line writer,
//! - stdout, for interactive use.
//!
//! `RUST_LOG` takes precedence over the default `info` level.

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::error::ServerError;

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping this guard flushes and closes the log file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

/// Initialize logging.
///
/// The log file is opened in append mode and created if missing. Fails if
/// the file cannot be opened or a global subscriber is already installed.
pub fn init(log_file: &Path) -> Result<LoggingGuard, ServerError> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|source| ServerError::Logging {
            path: log_file.to_path_buf(),
            source,
        })?;

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_names(true);

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_thread_names(true)
        .compact();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| ServerError::Logging {
            path: log_file.to_path_buf(),
            source: io::Error::other(e),
        })?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
