//! A static-site HTTP server built on `epoll`.
//!
//! One acceptor thread accepts TCP connections and hands each one, by
//! ownership transfer, to one of a fixed pool of worker threads. Every worker
//! runs its own edge-triggered event loop with a private connection registry
//! and a hashed timer wheel that evicts idle connections, so workers never
//! share mutable state.
//!
//! ```no_run
//! use ssgd::{Server, signal};
//!
//! let server = Server::builder()
//!     .port(8080)
//!     .workers(4)
//!     .document_root("./ssg_output")
//!     .bind()?;
//!
//! signal::install(server.shutdown_handle())?;
//! server.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod reactor;
mod utils;

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod net;
pub mod server;
pub mod signal;

pub use config::Config;
pub use error::{Result, ServerError};
pub use server::{Server, ServerBuilder};
pub use signal::Shutdown;
