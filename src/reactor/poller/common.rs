/// Readiness a registration is interested in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Interest {
    pub(crate) read: bool,
    pub(crate) write: bool,

    /// Report readiness once per transition instead of while it persists.
    ///
    /// Edge-triggered sources must be drained until `WouldBlock`, or any
    /// data left in the kernel buffer is never reported again.
    pub(crate) edge: bool,
}

impl Interest {
    /// Level-triggered readability. Used for the listening socket and the
    /// handoff channel's notification descriptor.
    pub(crate) const READABLE: Interest = Interest {
        read: true,
        write: false,
        edge: false,
    };

    /// Edge-triggered readability. Used for client connections.
    pub(crate) const READABLE_EDGE: Interest = Interest {
        read: true,
        write: false,
        edge: true,
    };

    /// Edge-triggered readability and writability. Used for client
    /// connections while a response is waiting for send-buffer space.
    pub(crate) const READ_WRITE_EDGE: Interest = Interest {
        read: true,
        write: true,
        edge: true,
    };
}
