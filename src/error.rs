//! Error types.
//!
//! [`ServerError`] covers everything that aborts startup. Errors that only
//! affect a single connection never surface here: the worker that owns the
//! connection closes it and logs.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Fatal server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created, bound or put in listen mode.
    #[error("failed to bind listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    /// An `epoll` instance could not be created.
    #[error("failed to create poller for {owner}: {source}")]
    Poller {
        owner: String,
        #[source]
        source: io::Error,
    },

    /// A worker's handoff channel could not be created or registered.
    #[error("failed to set up handoff channel for worker {worker}: {source}")]
    Handoff {
        worker: usize,
        #[source]
        source: io::Error,
    },

    /// A timer wheel was configured with no slots or a zero interval.
    #[error("invalid timer wheel: {slot_count} slots of {slot_interval:?}")]
    TimerWheel {
        slot_count: usize,
        slot_interval: Duration,
    },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker {worker}: {source}")]
    Spawn {
        worker: usize,
        #[source]
        source: io::Error,
    },

    /// The document root does not exist or cannot be canonicalized.
    #[error("invalid document root {path}: {source}")]
    DocumentRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The builder was given settings the server cannot run with.
    #[error("invalid server settings: {0}")]
    Settings(String),

    /// The configuration file could not be parsed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The log sink could not be opened.
    #[error("failed to initialize logging at {path}: {source}")]
    Logging {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
