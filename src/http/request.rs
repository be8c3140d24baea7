//! Request line parsing.
//!
//! Only the request line is interpreted (`METHOD SP URI SP VERSION`); header
//! fields are accepted but ignored.

use super::HttpError;

/// Largest request head the server buffers before giving up with `400`.
pub const MAX_HEAD_LEN: usize = 8 * 1024;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: String,
    pub uri: String,
}

impl Request {
    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

/// Returns the length of the request head if `buffer` holds a complete one.
///
/// The head ends at the first empty line, `\r\n\r\n` or a bare `\n\n`.
pub fn head_len(buffer: &[u8]) -> Option<usize> {
    let crlf = buffer
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .map(|i| i + 4);

    let lf = buffer.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);

    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

/// Parses the request line at the start of `buffer`.
pub fn parse(buffer: &[u8]) -> Result<Request, HttpError> {
    let end = buffer
        .iter()
        .position(|&b| b == b'\n')
        .unwrap_or(buffer.len());

    let line = std::str::from_utf8(&buffer[..end]).map_err(|_| HttpError::BadRequest)?;
    let mut parts = line.trim_end_matches('\r').split(' ');

    let method = parts.next().filter(|m| !m.is_empty());
    let uri = parts.next().filter(|u| u.starts_with('/'));

    match (method, uri) {
        (Some(method), Some(uri)) => Ok(Request {
            method: method.to_string(),
            uri: uri.to_string(),
        }),
        _ => Err(HttpError::BadRequest),
    }
}
