//! Platform-specific I/O poller abstraction.
//!
//! The poller is used by the acceptor to wait for pending connections and by
//! every worker reactor to wait for readable client sockets and handoff
//! notifications, always with a bounded timeout.
//!
//! Only the Linux `epoll` backend exists; the concrete implementation is
//! selected at compile time.

pub(crate) mod common;

pub(crate) use common::Interest;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
