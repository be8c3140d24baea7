//! Acceptor-to-worker handoff channel.
//!
//! A bounded, ordered, single-producer/single-consumer queue that moves
//! ownership of accepted connections from the acceptor thread to exactly one
//! worker. The queue itself is a `std::sync::mpsc::sync_channel`; what this
//! module adds is an `eventfd` the worker registers with its poller, so a
//! handoff wakes the worker's event loop like any other readiness source.
//!
//! Closing the sender is observed by the receiver as end-of-input, which is
//! distinct from "nothing queued right now".

use crate::reactor::poller::platform::{
    sys_close, sys_eventfd, sys_eventfd_clear, sys_eventfd_notify,
};

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, SyncSender, TryRecvError, TrySendError};

/// Readiness notification shared by both ends of a channel.
struct Notifier(RawFd);

impl Drop for Notifier {
    fn drop(&mut self) {
        sys_close(self.0);
    }
}

/// Creates a handoff channel holding at most `capacity` queued items.
pub(crate) fn channel<T>(capacity: usize) -> io::Result<(HandoffSender<T>, HandoffReceiver<T>)> {
    let notifier = Arc::new(Notifier(sys_eventfd()?));
    let (sender, receiver) = mpsc::sync_channel(capacity);

    Ok((
        HandoffSender {
            sender: Some(sender),
            notifier: notifier.clone(),
        },
        HandoffReceiver { receiver, notifier },
    ))
}

/// Why a send did not go through. Ownership of the item goes back to the
/// caller either way.
#[derive(Debug)]
pub(crate) enum SendError<T> {
    /// The queue is at capacity; retrying later may succeed.
    Full(T),

    /// Either side has been closed; retrying will never succeed.
    Closed(T),
}

/// Producer side, owned by the acceptor.
pub(crate) struct HandoffSender<T> {
    sender: Option<SyncSender<T>>,
    notifier: Arc<Notifier>,
}

impl<T> HandoffSender<T> {
    /// Queues `item` without blocking and wakes the receiver.
    pub(crate) fn send(&self, item: T) -> Result<(), SendError<T>> {
        let Some(sender) = &self.sender else {
            return Err(SendError::Closed(item));
        };

        match sender.try_send(item) {
            Ok(()) => {
                sys_eventfd_notify(self.notifier.0);
                Ok(())
            }
            Err(TrySendError::Full(item)) => {
                // Make sure the worker is draining before the caller retries.
                sys_eventfd_notify(self.notifier.0);
                Err(SendError::Full(item))
            }
            Err(TrySendError::Disconnected(item)) => Err(SendError::Closed(item)),
        }
    }

    /// Closes the channel. Items already queued are still delivered.
    ///
    /// Closing more than once has no further effect.
    pub(crate) fn close(&mut self) {
        if self.sender.take().is_some() {
            sys_eventfd_notify(self.notifier.0);
        }
    }
}

impl<T> Drop for HandoffSender<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything that was waiting in the channel at the time of a drain.
pub(crate) struct Batch<T> {
    /// Items in the order they were sent.
    pub(crate) items: Vec<T>,

    /// The sender is gone and the queue is empty: nothing will ever arrive
    /// again.
    pub(crate) closed: bool,
}

/// Consumer side, owned by a worker.
pub(crate) struct HandoffReceiver<T> {
    receiver: Receiver<T>,
    notifier: Arc<Notifier>,
}

impl<T> HandoffReceiver<T> {
    /// Takes every queued item without blocking.
    pub(crate) fn try_recv_batch(&self) -> Batch<T> {
        // Clear first: anything sent after this point notifies again.
        sys_eventfd_clear(self.notifier.0);

        let mut items = Vec::new();

        loop {
            match self.receiver.try_recv() {
                Ok(item) => items.push(item),
                Err(TryRecvError::Empty) => return Batch { items, closed: false },
                Err(TryRecvError::Disconnected) => return Batch { items, closed: true },
            }
        }
    }
}

impl<T> AsRawFd for HandoffReceiver<T> {
    /// Descriptor that turns readable whenever the receiver has work.
    fn as_raw_fd(&self) -> RawFd {
        self.notifier.0
    }
}
