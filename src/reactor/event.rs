use crate::utils::Key;

/// Reserved token for a worker's handoff channel.
const HANDOFF_TOKEN: u64 = u64::MAX;

/// Reserved token for the acceptor's listening socket.
const LISTENER_TOKEN: u64 = u64::MAX - 1;

/// Identifies what a readiness registration belongs to.
///
/// Every descriptor registered with a poller carries one of these, encoded
/// into the 64-bit epoll payload. The reserved values sit at the very top of
/// the token space, where a registry [`Key`] never lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Source {
    /// The worker's handoff channel has connections (or a close) pending.
    Handoff,

    /// The listening socket has connections pending.
    Listener,

    /// A client connection, keyed into the worker's registry.
    Connection(Key),
}

impl Source {
    pub(crate) fn to_token(self) -> u64 {
        match self {
            Source::Handoff => HANDOFF_TOKEN,
            Source::Listener => LISTENER_TOKEN,
            Source::Connection(key) => key.to_u64(),
        }
    }

    pub(crate) fn from_token(token: u64) -> Self {
        match token {
            HANDOFF_TOKEN => Source::Handoff,
            LISTENER_TOKEN => Source::Listener,
            raw => Source::Connection(Key::from_u64(raw)),
        }
    }
}

/// An I/O event reported by the poller.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Event {
    pub(crate) source: Source,

    /// Readable, or the peer hung up / the descriptor errored. Either way a
    /// read will not block and will tell the caller what happened.
    pub(crate) readable: bool,

    /// The send buffer has room again.
    pub(crate) writable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Slab;

    #[test]
    fn test_reserved_sources_roundtrip() {
        assert_eq!(Source::from_token(Source::Handoff.to_token()), Source::Handoff);
        assert_eq!(Source::from_token(Source::Listener.to_token()), Source::Listener);
    }

    #[test]
    fn test_connection_source_keeps_generation() {
        let mut slab = Slab::with_capacity(1);
        let first = slab.insert(());
        slab.remove(first);
        let second = slab.insert(());

        let decoded = Source::from_token(Source::Connection(second).to_token());
        assert_eq!(decoded, Source::Connection(second));
        assert_ne!(decoded, Source::Connection(first));
    }
}
