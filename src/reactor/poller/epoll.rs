//! Linux `epoll`-based poller implementation.
//!
//! Responsibilities:
//! - Register file descriptors with read/write interests, level- or
//!   edge-triggered, tagged with their [`Source`]
//! - Block waiting for I/O readiness, always with a bounded timeout
//! - Translate raw epoll events back into tagged [`Event`]s

use super::common::Interest;
use crate::reactor::event::{Event, Source};

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT,
    EPOLLRDHUP, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// Maximum number of events collected per `epoll_wait` call.
const MAX_EVENTS: usize = 64;

/// Linux `epoll` poller.
///
/// Each acceptor and worker owns exactly one of these; it is never shared
/// between threads.
pub(crate) struct EpollPoller {
    /// Epoll file descriptor.
    epoll: RawFd,

    /// Reusable buffer for epoll events.
    events: Vec<epoll_event>,
}

// The epoll descriptor is moved to the worker thread before it is used and is
// only ever touched from that one thread afterwards.
unsafe impl Send for EpollPoller {}

impl EpollPoller {
    /// Creates a new epoll instance.
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(MAX_EVENTS),
        })
    }

    /// Register a file descriptor with the poller.
    pub(crate) fn register(&self, fd: RawFd, source: Source, interest: Interest) -> io::Result<()> {
        self.control(EPOLL_CTL_ADD, fd, source, interest)
    }

    /// Replace the interest of an already registered file descriptor.
    ///
    /// For edge-triggered registrations this re-arms the edge: readiness
    /// that already holds is reported again on the next poll.
    pub(crate) fn modify(&self, fd: RawFd, source: Source, interest: Interest) -> io::Result<()> {
        self.control(EPOLL_CTL_MOD, fd, source, interest)
    }

    fn control(&self, op: i32, fd: RawFd, source: Source, interest: Interest) -> io::Result<()> {
        let mut flags = 0;

        if interest.read {
            flags |= EPOLLIN | EPOLLRDHUP;
        }
        if interest.write {
            flags |= EPOLLOUT;
        }
        if interest.edge {
            flags |= EPOLLET;
        }

        let mut event = epoll_event {
            events: flags as u32,
            u64: source.to_token(),
        };

        let rc = unsafe { epoll_ctl(self.epoll, op, fd, &mut event) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Remove a file descriptor from the poller.
    pub(crate) fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut()) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(())
    }

    /// Poll for I/O readiness events.
    ///
    /// Blocks until at least one descriptor becomes ready or `timeout`
    /// expires. An interrupted wait is reported as an empty batch.
    pub(crate) fn poll(&mut self, events: &mut Vec<Event>, timeout: Duration) -> io::Result<()> {
        events.clear();

        // Round up so a sub-millisecond remainder does not turn into a busy loop.
        let timeout_ms = timeout.as_nanos().div_ceil(1_000_000).min(i32::MAX as u128) as i32;

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                MAX_EVENTS as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        for ev in &self.events {
            let flags = ev.events;

            events.push(Event {
                source: Source::from_token(ev.u64),
                readable: flags & ((EPOLLIN | EPOLLRDHUP | EPOLLERR | EPOLLHUP) as u32) != 0,
                writable: flags & (EPOLLOUT as u32) != 0,
            });
        }

        Ok(())
    }
}

impl Drop for EpollPoller {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
