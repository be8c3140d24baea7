//! Readiness multiplexing and idle-timer bookkeeping.
//!
//! This module holds the building blocks every event loop in the server is
//! made of:
//! - the `epoll` poller and its raw socket syscalls,
//! - event-source tagging, so a readiness event can be routed to the
//!   handoff channel, the listener or a specific connection,
//! - the hashed timer wheel that evicts idle connections.
//!
//! Nothing in here spawns threads or shares state; each acceptor and worker
//! owns its own instances.

pub(crate) mod event;
pub(crate) mod poller;
pub(crate) mod timer;

pub(crate) use event::{Event, Source};
pub(crate) use poller::{Interest, Poller};
pub(crate) use timer::{TickClock, TimerHandle, TimerWheel};
