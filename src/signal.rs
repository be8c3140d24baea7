//! Cooperative shutdown.
//!
//! A [`Shutdown`] token is polled by the acceptor at every bounded wait.
//! Workers never look at it: the acceptor propagates shutdown to them by
//! closing their handoff channels.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::reactor::poller::platform::sys_ignore_sigpipe;

/// A cloneable, process-wide cancellation flag.
#[derive(Clone, Debug, Default)]
pub struct Shutdown {
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests shutdown. Returns `true` if it had already been requested.
    pub fn trigger(&self) -> bool {
        self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Install handlers for SIGINT and SIGTERM that trigger `shutdown`.
///
/// A second signal while shutdown is in progress exits immediately.
pub fn install(shutdown: Shutdown) -> io::Result<()> {
    ctrlc::set_handler(move || {
        if shutdown.trigger() {
            tracing::warn!("Received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        tracing::info!("Received shutdown signal, initiating graceful shutdown...");
    })
    .map_err(io::Error::other)
}

/// Ignore SIGPIPE so writes to a closed peer fail with `EPIPE` instead of
/// killing the process.
pub fn ignore_sigpipe() {
    sys_ignore_sigpipe();
}
