use crate::http::{Disposition, MAX_HEAD_LEN, Reply, request::head_len};
use crate::net::TcpStream;
use crate::reactor::TimerHandle;
use crate::utils::{Key, Slab};

use std::fs::File;
use std::io::{self, Read, Write};
use std::net::SocketAddr;

const READ_CHUNK: usize = 4096;

/// Size of each slice of a file body staged for sending.
const WRITE_CHUNK: usize = 64 * 1024;

/// A client connection, exclusively owned by one worker once handed off.
pub(crate) struct Connection {
    pub(crate) stream: TcpStream,

    /// Remote address, for logs.
    pub(crate) peer: String,

    /// Idle timer, present while the connection is armed in the wheel.
    pub(crate) timer: Option<TimerHandle>,

    /// Bytes of a request head that has not been answered yet.
    pub(crate) buffer: Vec<u8>,

    /// Response still being sent.
    pub(crate) outgoing: Option<Outgoing>,

    /// The peer has shut down its sending side.
    pub(crate) read_closed: bool,

    /// Registered for writability as well as readability.
    pub(crate) write_interest: bool,
}

/// Where a read drain stopped.
#[derive(Debug)]
pub(crate) enum ReadStatus {
    /// The socket has nothing more for now.
    Drained,

    /// A complete head is buffered and the buffer reached its limit, so
    /// reading stopped before the socket was drained.
    Paused,

    /// The peer closed its side.
    Eof,

    /// The buffered head grew past the limit before it was complete.
    Oversized,

    Failed(io::Error),
}

/// How far a flush got.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Flush {
    /// The whole response has been handed to the kernel.
    Done,

    /// The send buffer is full; the rest waits for writability.
    Blocked,
}

/// A response in flight: staged bytes plus the unread rest of the file.
pub(crate) struct Outgoing {
    pending: Vec<u8>,
    sent: usize,
    body: Option<File>,
    pub(crate) disposition: Disposition,
}

impl Outgoing {
    pub(crate) fn new(reply: Reply) -> Self {
        Self {
            pending: reply.head,
            sent: 0,
            body: reply.body,
            disposition: reply.disposition,
        }
    }

    /// Writes as much as the socket accepts without blocking.
    ///
    /// Returns the outcome and the number of bytes written.
    fn write_to<W: Write>(&mut self, out: &mut W) -> io::Result<(Flush, usize)> {
        let mut written = 0;

        loop {
            if self.sent < self.pending.len() {
                match out.write(&self.pending[self.sent..]) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(n) => {
                        self.sent += n;
                        written += n;
                    }
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        return Ok((Flush::Blocked, written));
                    }
                    Err(e) => return Err(e),
                }
                continue;
            }

            let Some(body) = self.body.as_mut() else {
                return Ok((Flush::Done, written));
            };

            self.pending.resize(WRITE_CHUNK, 0);
            let n = body.read(&mut self.pending)?;
            self.pending.truncate(n);
            self.sent = 0;

            if n == 0 {
                self.body = None;
            }
        }
    }
}

impl Connection {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            stream,
            peer: peer.ip().to_string(),
            timer: None,
            buffer: Vec::new(),
            outgoing: None,
            read_closed: false,
            write_interest: false,
        }
    }

    /// Reads until the socket would block, appending to the head buffer.
    ///
    /// The socket is edge-triggered, so the caller only hears about it again
    /// once new data arrives after this returns [`ReadStatus::Drained`].
    pub(crate) fn fill(&mut self) -> ReadStatus {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.read_closed = true;
                    return ReadStatus::Eof;
                }
                Ok(n) => {
                    self.buffer.extend_from_slice(&chunk[..n]);

                    if self.buffer.len() > MAX_HEAD_LEN {
                        return match head_len(&self.buffer) {
                            Some(len) if len <= MAX_HEAD_LEN => ReadStatus::Paused,
                            _ => ReadStatus::Oversized,
                        };
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadStatus::Drained,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return ReadStatus::Failed(e),
            }
        }
    }

    /// Sends as much of the in-flight response as the socket accepts.
    ///
    /// Returns [`Flush::Done`] when there is nothing (left) to send, along
    /// with the number of bytes written by this call.
    pub(crate) fn flush(&mut self) -> io::Result<(Flush, usize)> {
        match self.outgoing.as_mut() {
            Some(outgoing) => outgoing.write_to(&mut self.stream),
            None => Ok((Flush::Done, 0)),
        }
    }
}

/// Per-worker table of live connections.
///
/// Keys double as poller tokens and timer owners. They are
/// generation-checked, so an event or expiry that refers to a connection
/// already closed (and whose slot may have been reused) finds nothing.
pub(crate) struct Registry {
    connections: Slab<Connection>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            connections: Slab::with_capacity(64),
        }
    }

    pub(crate) fn insert(&mut self, connection: Connection) -> Key {
        self.connections.insert(connection)
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut Connection> {
        self.connections.get_mut(key)
    }

    pub(crate) fn remove(&mut self, key: Key) -> Option<Connection> {
        self.connections.remove(key)
    }

    pub(crate) fn keys(&self) -> Vec<Key> {
        self.connections.keys()
    }

    pub(crate) fn len(&self) -> usize {
        self.connections.len()
    }
}
