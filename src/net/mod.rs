//! TCP networking primitives.
//!
//! Thin, non-blocking wrappers over raw socket descriptors. They own their
//! descriptor and close it on drop, which is what "releasing the socket"
//! means everywhere else in the server.

mod tcp;

pub use tcp::listener::TcpListener;
pub use tcp::stream::TcpStream;
