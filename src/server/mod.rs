//! The server: one acceptor plus a fixed pool of worker reactors.
//!
//! ```text
//!              +----------+   handoff 0   +----------+
//!  listener -> | acceptor | ------------> | worker 0 |  epoll + wheel + registry
//!              |          | ------------> | worker 1 |
//!              +----------+   handoff n   +----------+
//! ```
//!
//! Everything that can fail at startup (binding, pollers, channels, timer
//! wheels) is created by [`ServerBuilder::bind`], before any thread exists.
//! [`Server::run`] then spawns the workers and runs the acceptor on the
//! calling thread until the shutdown token is triggered.

mod acceptor;
mod connection;
mod handoff;
mod worker;

use crate::config::{self, Config};
use crate::error::{Result, ServerError};
use crate::net::TcpListener;
use crate::signal::Shutdown;
use acceptor::{Acceptor, Dispatcher};
use worker::Worker;

use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info};

/// Default timer wheel resolution.
pub const DEFAULT_SLOT_INTERVAL: Duration = Duration::from_secs(1);

/// Default number of timer wheel slots.
pub const DEFAULT_WHEEL_SLOTS: usize = 64;

/// Longest a worker waits for readiness before re-checking its timers.
const WORKER_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Read-only settings shared by every worker.
#[derive(Debug)]
pub(crate) struct Settings {
    /// Canonical document root.
    pub(crate) document_root: PathBuf,
    pub(crate) idle_timeout: Duration,
    pub(crate) slot_interval: Duration,
    pub(crate) wheel_slots: usize,
    pub(crate) poll_timeout: Duration,
}

/// Configures and binds a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerBuilder {
    port: u16,
    num_workers: usize,
    document_root: PathBuf,
    idle_timeout: Duration,
    handoff_capacity: usize,
    slot_interval: Duration,
    wheel_slots: usize,
    shutdown: Option<Shutdown>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            port: config::DEFAULT_PORT,
            num_workers: config::DEFAULT_WORKERS,
            document_root: PathBuf::from(config::DEFAULT_DOCUMENT_ROOT),
            idle_timeout: config::DEFAULT_IDLE_TIMEOUT,
            handoff_capacity: config::DEFAULT_HANDOFF_CAPACITY,
            slot_interval: DEFAULT_SLOT_INTERVAL,
            wheel_slots: DEFAULT_WHEEL_SLOTS,
            shutdown: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .port(config.port)
            .workers(config.num_workers)
            .document_root(config.document_root.clone())
            .idle_timeout(config.idle_timeout)
            .handoff_capacity(config.handoff_capacity)
    }

    /// Port to bind on all interfaces. `0` picks an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    pub fn document_root(mut self, document_root: impl Into<PathBuf>) -> Self {
        self.document_root = document_root.into();
        self
    }

    pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn handoff_capacity(mut self, capacity: usize) -> Self {
        self.handoff_capacity = capacity;
        self
    }

    /// Resolution of the idle timers. Timeouts are rounded down to whole
    /// intervals, with a minimum of one.
    pub fn slot_interval(mut self, slot_interval: Duration) -> Self {
        self.slot_interval = slot_interval;
        self
    }

    /// Number of wheel slots. Timeouts longer than
    /// `slot_interval * wheel_slots` are cut to that.
    pub fn wheel_slots(mut self, wheel_slots: usize) -> Self {
        self.wheel_slots = wheel_slots;
        self
    }

    /// Uses an existing shutdown token instead of a fresh one.
    pub fn shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Validates the settings, binds the listener and builds every worker.
    pub fn bind(self) -> Result<Server> {
        if self.num_workers == 0 {
            return Err(ServerError::Settings("at least one worker is required".into()));
        }
        if self.handoff_capacity == 0 {
            return Err(ServerError::Settings("handoff capacity must be positive".into()));
        }

        let document_root =
            fs::canonicalize(&self.document_root).map_err(|source| ServerError::DocumentRoot {
                path: self.document_root.clone(),
                source,
            })?;

        let address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port));
        let listener = TcpListener::bind(address).map_err(|source| ServerError::Bind {
            port: self.port,
            source,
        })?;

        let settings = Arc::new(Settings {
            document_root,
            idle_timeout: self.idle_timeout,
            slot_interval: self.slot_interval,
            wheel_slots: self.wheel_slots,
            poll_timeout: WORKER_POLL_TIMEOUT,
        });

        let mut senders = Vec::with_capacity(self.num_workers);
        let mut workers = Vec::with_capacity(self.num_workers);

        for id in 0..self.num_workers {
            let (sender, receiver) = handoff::channel(self.handoff_capacity)
                .map_err(|source| ServerError::Handoff { worker: id, source })?;

            workers.push(Worker::new(id, receiver, settings.clone())?);
            senders.push(sender);
        }

        let shutdown = self.shutdown.unwrap_or_default();
        let acceptor = Acceptor::new(listener, Dispatcher::new(senders), shutdown.clone())?;

        Ok(Server {
            acceptor,
            workers,
            settings,
            shutdown,
        })
    }
}

/// A bound, not yet running server.
pub struct Server {
    acceptor: Acceptor,
    workers: Vec<Worker>,
    settings: Arc<Settings>,
    shutdown: Shutdown,
}

impl Server {
    /// Builds a server from a loaded configuration.
    pub fn bind(config: &Config) -> Result<Self> {
        ServerBuilder::from_config(config).bind()
    }

    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.acceptor.listener().local_addr()?)
    }

    /// Token that stops [`run`](Self::run) when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serves until shutdown is requested.
    ///
    /// Spawns the workers, accepts on the calling thread, and returns once
    /// every worker has drained its channel and closed its connections.
    pub fn run(self) -> Result<()> {
        let Server {
            mut acceptor,
            workers,
            settings,
            shutdown,
        } = self;

        info!(
            address = %acceptor.listener().local_addr()?,
            workers = workers.len(),
            document_root = %settings.document_root.display(),
            idle_timeout = ?settings.idle_timeout,
            "Server listening"
        );

        let mut handles = Vec::with_capacity(workers.len());

        for (id, worker) in workers.into_iter().enumerate() {
            let spawned = thread::Builder::new()
                .name(format!("worker-{id}"))
                .spawn(move || worker.run());

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(source) => {
                    // Stop the workers already running.
                    shutdown.trigger();
                    acceptor.run();
                    join_workers(handles);
                    return Err(ServerError::Spawn { worker: id, source });
                }
            }
        }

        acceptor.run();
        join_workers(handles);

        info!("Server stopped");
        Ok(())
    }
}

fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        let name = handle.thread().name().unwrap_or("worker").to_string();

        if handle.join().is_err() {
            error!(worker = %name, "Worker thread panicked");
        }
    }
}
