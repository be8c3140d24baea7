//! Worker reactor.
//!
//! Each worker runs a single-threaded loop over its own poller. It adopts
//! connections from its handoff channel, reads requests on edge-triggered
//! readiness, answers them with the request handler, and evicts connections
//! that stay idle for longer than the configured timeout.
//!
//! One loop iteration:
//! 1. wait for readiness, at most until the next wheel tick is due,
//! 2. advance the timer wheel by every elapsed tick and close what expired,
//! 3. dispatch the readiness events.
//!
//! Expiry runs before dispatch, so a connection whose timer fired is closed
//! even if it became readable in the same iteration. Its stale event then
//! resolves to nothing in the registry and is dropped.
//!
//! Responses never block the loop. Whatever the socket does not accept right
//! away stays with the connection, which is then registered for writability
//! and resumed on the next writable event. No further request is read from a
//! connection until its current response has been flushed.

use super::Settings;
use super::connection::{Connection, Flush, Outgoing, ReadStatus, Registry};
use super::handoff::HandoffReceiver;
use crate::error::ServerError;
use crate::http::{self, Disposition, MAX_HEAD_LEN, Reply, StatusCode, request::head_len};
use crate::reactor::{Event, Interest, Poller, Source, TickClock, TimerWheel};
use crate::utils::Key;

use std::os::fd::AsRawFd;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, error, info, warn};

pub(crate) struct Worker {
    id: usize,
    handoff: HandoffReceiver<Connection>,
    poller: Poller,
    wheel: TimerWheel<Key>,
    registry: Registry,
    settings: Arc<Settings>,
}

impl Worker {
    /// Sets up the worker's poller and timer wheel.
    ///
    /// Runs on the spawning thread so that a failure aborts startup before
    /// any worker is running.
    pub(crate) fn new(
        id: usize,
        handoff: HandoffReceiver<Connection>,
        settings: Arc<Settings>,
    ) -> Result<Self, ServerError> {
        let poller = Poller::new().map_err(|source| ServerError::Poller {
            owner: format!("worker {id}"),
            source,
        })?;

        poller
            .register(handoff.as_raw_fd(), Source::Handoff, Interest::READABLE)
            .map_err(|source| ServerError::Handoff { worker: id, source })?;

        let wheel = TimerWheel::new(settings.wheel_slots, settings.slot_interval)?;
        if settings.idle_timeout > wheel.horizon() {
            warn!(
                worker = id,
                idle_timeout = ?settings.idle_timeout,
                horizon = ?wheel.horizon(),
                "Idle timeout exceeds the timer wheel horizon and will be truncated"
            );
        }

        Ok(Self {
            id,
            handoff,
            poller,
            wheel,
            registry: Registry::new(),
            settings,
        })
    }

    /// Runs until the handoff channel is closed, then closes every
    /// connection the worker still holds.
    pub(crate) fn run(mut self) {
        info!(worker = self.id, "Worker started");

        let mut clock = TickClock::new(self.wheel.slot_interval(), Instant::now());
        let mut events: Vec<Event> = Vec::with_capacity(64);

        while self.turn(&mut clock, &mut events) {}

        self.close_all();
    }

    /// One loop iteration. Returns `false` once the worker should stop.
    fn turn(&mut self, clock: &mut TickClock, events: &mut Vec<Event>) -> bool {
        let timeout = clock
            .until_next(Instant::now())
            .min(self.settings.poll_timeout);

        if let Err(e) = self.poller.poll(events, timeout) {
            error!(worker = self.id, error = %e, "Poll failed, stopping worker");
            return false;
        }

        for _ in 0..clock.due(Instant::now()) {
            self.expire();
        }

        let mut finished = false;

        for event in events.drain(..) {
            match event.source {
                Source::Handoff => finished |= self.adopt_pending(),
                Source::Connection(key) => self.on_ready(key, event),
                Source::Listener => {}
            }
        }

        !finished
    }

    /// Takes everything queued on the handoff channel. Returns `true` once
    /// the channel is closed and empty.
    fn adopt_pending(&mut self) -> bool {
        let batch = self.handoff.try_recv_batch();

        for connection in batch.items {
            self.adopt(connection);
        }

        if batch.closed {
            debug!(worker = self.id, "Handoff channel closed");
        }

        batch.closed
    }

    fn adopt(&mut self, connection: Connection) -> Option<Key> {
        if let Err(e) = connection.stream.set_nonblocking() {
            warn!(worker = self.id, peer = %connection.peer, error = %e, "Failed to make connection non-blocking");
            return None;
        }

        let fd = connection.stream.as_raw_fd();
        let key = self.registry.insert(connection);

        if let Err(e) = self
            .poller
            .register(fd, Source::Connection(key), Interest::READABLE_EDGE)
        {
            warn!(worker = self.id, error = %e, "Failed to register connection");
            self.registry.remove(key);
            return None;
        }

        let timer = self.wheel.insert(key, self.settings.idle_timeout);
        if let Some(connection) = self.registry.get_mut(key) {
            connection.timer = Some(timer);
        }

        debug!(worker = self.id, active = self.registry.len(), "Connection adopted");
        Some(key)
    }

    /// Handles readiness on one connection.
    fn on_ready(&mut self, key: Key, event: Event) {
        let Some(connection) = self.registry.get_mut(key) else {
            return;
        };

        // Reads wait while a response is in flight; the flush picks them up.
        if event.readable
            && connection.outgoing.is_none()
            && let ReadStatus::Failed(e) = connection.fill()
        {
            debug!(worker = self.id, peer = %connection.peer, error = %e, "Read failed");
            self.close(key, "read error");
            return;
        }

        self.advance(key);
    }

    /// Moves a connection forward as far as it can go without blocking:
    /// answers a buffered request, sends what the socket accepts, and once a
    /// response is out, reads what arrived in the meantime and starts over.
    fn advance(&mut self, key: Key) {
        loop {
            let Some(connection) = self.registry.get_mut(key) else {
                return;
            };

            if connection.outgoing.is_none() {
                let reply = match head_len(&connection.buffer) {
                    Some(len) if len <= MAX_HEAD_LEN => {
                        let _span =
                            debug_span!("request", worker = self.id, peer = %connection.peer)
                                .entered();

                        http::respond(&connection.buffer[..len], &self.settings.document_root)
                    }
                    _ if connection.buffer.len() > MAX_HEAD_LEN => {
                        debug!(worker = self.id, peer = %connection.peer, "Request head too large");
                        Reply::error(StatusCode::BadRequest)
                    }
                    _ if connection.read_closed => {
                        self.close(key, "peer closed");
                        return;
                    }
                    _ => return,
                };

                // One request at a time: whatever was read past the head is dropped.
                connection.buffer.clear();
                connection.outgoing = Some(Outgoing::new(reply));
            }

            let written = match connection.flush() {
                Ok((Flush::Done, written)) => written,
                Ok((Flush::Blocked, written)) => {
                    let fd = connection.stream.as_raw_fd();
                    let first_block = !connection.write_interest;
                    connection.write_interest = true;

                    if first_block
                        && let Err(e) =
                            self.poller
                                .modify(fd, Source::Connection(key), Interest::READ_WRITE_EDGE)
                    {
                        warn!(worker = self.id, error = %e, "Failed to watch connection for writability");
                        self.close(key, "poller error");
                        return;
                    }

                    // A reader that keeps taking bytes is not idle.
                    if written > 0 {
                        self.rearm(key);
                    }
                    return;
                }
                Err(e) => {
                    debug!(worker = self.id, peer = %connection.peer, error = %e, "Write failed");
                    self.close(key, "write error");
                    return;
                }
            };

            let disposition = connection
                .outgoing
                .take()
                .map_or(Disposition::Close, |outgoing| outgoing.disposition);

            debug!(worker = self.id, peer = %connection.peer, bytes = written, "Response sent");

            if connection.write_interest {
                connection.write_interest = false;

                let fd = connection.stream.as_raw_fd();
                if let Err(e) = self
                    .poller
                    .modify(fd, Source::Connection(key), Interest::READABLE_EDGE)
                {
                    warn!(worker = self.id, error = %e, "Failed to restore read interest");
                    self.close(key, "poller error");
                    return;
                }
            }

            if disposition == Disposition::Close {
                self.close(key, "closed after response");
                return;
            }
            if connection.read_closed {
                self.close(key, "peer closed");
                return;
            }

            if let ReadStatus::Failed(e) = connection.fill() {
                debug!(worker = self.id, peer = %connection.peer, error = %e, "Read failed");
                self.close(key, "read error");
                return;
            }

            self.rearm(key);
        }
    }

    /// Restarts the idle timer after activity on a connection.
    fn rearm(&mut self, key: Key) {
        let Some(connection) = self.registry.get_mut(key) else {
            return;
        };

        if let Some(timer) = connection.timer.take() {
            self.wheel.remove(timer);
        }
        connection.timer = Some(self.wheel.insert(key, self.settings.idle_timeout));
    }

    /// Advances the wheel one slot and closes every connection that expired.
    fn expire(&mut self) {
        for key in self.wheel.tick() {
            if let Some(connection) = self.registry.get_mut(key) {
                connection.timer = None;
            }
            self.close(key, "idle timeout");
        }
    }

    /// Deregisters, disarms and drops a connection. Closing a connection that
    /// is already gone does nothing.
    fn close(&mut self, key: Key, reason: &'static str) {
        let Some(connection) = self.registry.remove(key) else {
            return;
        };

        if let Err(e) = self.poller.deregister(connection.stream.as_raw_fd()) {
            debug!(worker = self.id, error = %e, "Failed to deregister connection");
        }

        if let Some(timer) = connection.timer {
            self.wheel.remove(timer);
        }

        debug!(worker = self.id, peer = %connection.peer, reason, "Connection closed");
    }

    fn close_all(&mut self) {
        let keys = self.registry.keys();
        let count = keys.len();

        for key in keys {
            self.close(key, "worker shutting down");
        }
        debug_assert_eq!(self.wheel.len(), 0);

        info!(worker = self.id, closed = count, "Worker stopped");
    }
}
