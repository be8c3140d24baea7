use super::stream::TcpStream;
use crate::reactor::poller::platform::{
    sys_accept, sys_bind, sys_close, sys_listen, sys_set_reuseaddr, sys_socket, sys_sockname,
};

use libc::{AF_INET, AF_INET6};
use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, RawFd};

/// A non-blocking TCP listener.
///
/// `accept` never blocks: when no connection is pending it returns
/// `WouldBlock`, and the caller is expected to wait for readiness through a
/// poller.
#[derive(Debug)]
pub struct TcpListener {
    /// File descriptor of the listening socket.
    fd: RawFd,
}

impl TcpListener {
    /// Binds a TCP listener to the given address.
    ///
    /// This function:
    /// - creates a non-blocking socket,
    /// - enables `SO_REUSEADDR`,
    /// - binds and starts listening with the system maximum backlog.
    pub fn bind(address: SocketAddr) -> io::Result<Self> {
        let domain = match address {
            SocketAddr::V4(_) => AF_INET,
            SocketAddr::V6(_) => AF_INET6,
        };

        let listener = Self {
            fd: sys_socket(domain)?,
        };

        sys_set_reuseaddr(listener.fd)?;
        sys_bind(listener.fd, &address)?;
        sys_listen(listener.fd)?;

        Ok(listener)
    }

    /// Accepts a pending connection, returning the stream and peer address.
    pub fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (fd, address) = sys_accept(self.fd)?;

        Ok((TcpStream::from_fd(fd), address))
    }

    /// Returns the local socket address of this listener.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        sys_sockname(self.fd)
    }
}

impl AsRawFd for TcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TcpListener {
    /// Closes the listening socket.
    fn drop(&mut self) {
        sys_close(self.fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_without_pending_would_block() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();

        let err = listener.accept().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_accept_reports_peer() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        let client = std::net::TcpStream::connect(addr).unwrap();

        let (_stream, peer) = loop {
            match listener.accept() {
                Ok(accepted) => break accepted,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) => panic!("accept failed: {e}"),
            }
        };

        assert_eq!(peer, client.local_addr().unwrap());
    }
}
