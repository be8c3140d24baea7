//! Connection acceptor.
//!
//! Runs on the thread that called [`Server::run`](super::Server::run). It
//! waits on the listening socket with a bounded timeout so the shutdown token
//! is re-checked at least once per wait, accepts everything pending, and
//! hands each connection to the next worker in round-robin order.

use super::connection::Connection;
use super::handoff::{HandoffSender, SendError};
use crate::error::ServerError;
use crate::net::TcpListener;
use crate::reactor::{Event, Interest, Poller, Source};
use crate::signal::Shutdown;

use std::io;
use std::os::fd::AsRawFd;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Upper bound on how long a shutdown request can go unnoticed.
const ACCEPT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Pause before retrying a handoff to a full channel.
const FULL_BACKOFF: Duration = Duration::from_millis(1);

/// Pause after an accept error other than "nothing pending".
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Round-robin assignment of items to worker channels.
///
/// The i-th dispatched item goes to worker `i mod n`, whether or not the
/// handoff eventually succeeds.
pub(crate) struct Dispatcher<T> {
    senders: Vec<HandoffSender<T>>,
    next: usize,
}

impl<T> Dispatcher<T> {
    pub(crate) fn new(senders: Vec<HandoffSender<T>>) -> Self {
        Self { senders, next: 0 }
    }

    /// Hands `item` to the next worker, returning its index.
    ///
    /// A full channel is retried until it has room. The item is given back
    /// only if the channel is closed, or shutdown was requested while
    /// waiting for room.
    pub(crate) fn dispatch(&mut self, mut item: T, shutdown: &Shutdown) -> Result<usize, T> {
        if self.senders.is_empty() {
            return Err(item);
        }

        let worker = self.next;
        self.next = (self.next + 1) % self.senders.len();

        loop {
            match self.senders[worker].send(item) {
                Ok(()) => return Ok(worker),
                Err(SendError::Full(returned)) => {
                    if shutdown.is_triggered() {
                        return Err(returned);
                    }
                    item = returned;
                    thread::sleep(FULL_BACKOFF);
                }
                Err(SendError::Closed(returned)) => return Err(returned),
            }
        }
    }

    /// Closes every worker's channel. Each worker drains what was already
    /// queued and then stops.
    pub(crate) fn close_all(&mut self) {
        for sender in &mut self.senders {
            sender.close();
        }
    }
}

pub(crate) struct Acceptor {
    listener: TcpListener,
    poller: Poller,
    dispatcher: Dispatcher<Connection>,
    shutdown: Shutdown,
}

impl Acceptor {
    pub(crate) fn new(
        listener: TcpListener,
        dispatcher: Dispatcher<Connection>,
        shutdown: Shutdown,
    ) -> Result<Self, ServerError> {
        let poller = Poller::new()
            .and_then(|poller| {
                poller.register(listener.as_raw_fd(), Source::Listener, Interest::READABLE)?;
                Ok(poller)
            })
            .map_err(|source| ServerError::Poller {
                owner: "acceptor".to_string(),
                source,
            })?;

        Ok(Self {
            listener,
            poller,
            dispatcher,
            shutdown,
        })
    }

    pub(crate) fn listener(&self) -> &TcpListener {
        &self.listener
    }

    /// Accepts until shutdown is requested, then closes every handoff
    /// channel.
    pub(crate) fn run(&mut self) {
        let mut events: Vec<Event> = Vec::with_capacity(4);

        while !self.shutdown.is_triggered() {
            if let Err(e) = self.poller.poll(&mut events, ACCEPT_POLL_TIMEOUT) {
                error!(error = %e, "Acceptor poll failed");
                self.shutdown.trigger();
                break;
            }

            if events.drain(..).any(|event| event.source == Source::Listener) {
                self.accept_pending();
            }
        }

        info!("Acceptor stopped, closing handoff channels");
        self.dispatcher.close_all();
    }

    fn accept_pending(&mut self) {
        while !self.shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!(peer = %peer.ip(), "New connection");

                    let connection = Connection::new(stream, peer);
                    if let Err(connection) = self.dispatcher.dispatch(connection, &self.shutdown) {
                        warn!(peer = %connection.peer, "No worker took the connection, dropping it");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    thread::sleep(ACCEPT_ERROR_BACKOFF);
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::handoff::{self, HandoffReceiver};
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use tracing::Level;

    fn dispatcher(workers: usize, capacity: usize) -> (Dispatcher<usize>, Vec<HandoffReceiver<usize>>) {
        let (senders, receivers) = (0..workers)
            .map(|_| handoff::channel(capacity).unwrap())
            .unzip();

        (Dispatcher::new(senders), receivers)
    }

    #[test]
    fn test_round_robin_assignment() {
        let (mut dispatcher, receivers) = dispatcher(3, 8);
        let shutdown = Shutdown::new();

        for i in 0..7 {
            assert_eq!(dispatcher.dispatch(i, &shutdown), Ok(i % 3));
        }

        let received: Vec<Vec<usize>> = receivers
            .iter()
            .map(|receiver| receiver.try_recv_batch().items)
            .collect();

        assert_eq!(received, vec![vec![0, 3, 6], vec![1, 4], vec![2, 5]]);
    }

    #[test]
    fn test_full_channel_waits_for_room() {
        let (mut dispatcher, mut receivers) = dispatcher(1, 1);
        let shutdown = Shutdown::new();
        assert_eq!(dispatcher.dispatch(1, &shutdown), Ok(0));

        let receiver = receivers.remove(0);
        let drainer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut seen = receiver.try_recv_batch().items;
            while seen.len() < 2 {
                thread::sleep(Duration::from_millis(5));
                seen.extend(receiver.try_recv_batch().items);
            }
            seen
        });

        assert_eq!(dispatcher.dispatch(2, &shutdown), Ok(0));
        assert_eq!(drainer.join().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_full_channel_gives_up_on_shutdown() {
        let (mut dispatcher, _receivers) = dispatcher(1, 1);
        let shutdown = Shutdown::new();

        assert_eq!(dispatcher.dispatch(1, &shutdown), Ok(0));
        shutdown.trigger();
        assert_eq!(dispatcher.dispatch(2, &shutdown), Err(2));
    }

    #[test]
    fn test_closed_channels_reject() {
        let (mut dispatcher, receivers) = dispatcher(2, 4);
        let shutdown = Shutdown::new();

        dispatcher.close_all();
        dispatcher.close_all();
        assert_eq!(dispatcher.dispatch(1, &shutdown), Err(1));

        for receiver in &receivers {
            assert!(receiver.try_recv_batch().closed);
        }
    }

    #[test]
    fn test_no_workers_rejects() {
        let mut dispatcher: Dispatcher<u8> = Dispatcher::new(Vec::new());
        assert_eq!(dispatcher.dispatch(9, &Shutdown::new()), Err(9));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Accepts one connection under a subscriber capped at `level` and
    /// returns what was logged.
    fn accept_one_logged_at(level: Level) -> String {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        let address = listener.local_addr().unwrap();
        let (sender, receiver) = handoff::channel::<Connection>(4).unwrap();
        let mut acceptor =
            Acceptor::new(listener, Dispatcher::new(vec![sender]), Shutdown::new()).unwrap();

        let _client = std::net::TcpStream::connect(address).unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        tracing::subscriber::with_default(subscriber, || acceptor.accept_pending());
        assert_eq!(receiver.try_recv_batch().items.len(), 1);

        let bytes = captured.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_new_connections_are_logged_at_debug_only() {
        assert!(accept_one_logged_at(Level::DEBUG).contains("New connection"));
        assert!(!accept_one_logged_at(Level::INFO).contains("New connection"));
    }
}
