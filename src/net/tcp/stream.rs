use crate::reactor::poller::platform::{sys_close, sys_read, sys_set_nonblocking, sys_write};

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

/// An accepted TCP connection.
///
/// Once [`set_nonblocking`](Self::set_nonblocking) has been called, reads
/// report `WouldBlock` when the receive buffer is empty and writes report it
/// when the send buffer is full. Waiting for either is the poller's job.
#[derive(Debug)]
pub struct TcpStream {
    fd: RawFd,
}

impl TcpStream {
    /// Takes ownership of a connected socket descriptor.
    pub(crate) fn from_fd(fd: RawFd) -> Self {
        Self { fd }
    }

    /// Switches the socket to non-blocking mode.
    pub fn set_nonblocking(&self) -> io::Result<()> {
        sys_set_nonblocking(self.fd)
    }
}

impl Read for TcpStream {
    fn read(&mut self, buffer: &mut [u8]) -> io::Result<usize> {
        sys_read(self.fd, buffer)
    }
}

impl Write for TcpStream {
    fn write(&mut self, buffer: &[u8]) -> io::Result<usize> {
        loop {
            match sys_write(self.fd, buffer) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                result => return result,
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TcpStream {
    /// Closes the socket.
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}
