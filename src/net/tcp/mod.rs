//! TCP networking implementation.
//!
//! - [`listener`]: the non-blocking listening socket owned by the acceptor,
//! - [`stream`]: an accepted client socket owned by a worker.

pub mod listener;
pub mod stream;
