//! The request handler.
//!
//! A stateless request-to-response function: given one buffered request head
//! it parses the request line, opens the static file for a `GET`, and returns
//! a [`Reply`] for the caller to send at whatever pace the socket allows,
//! along with whether the connection may stay open afterwards.
//!
//! Only `GET` is implemented. Errors are answered with a minimal HTML page
//! and `Connection: close`.

pub mod files;
pub mod mime;
pub mod request;
pub mod response;
pub mod status;

pub use request::{MAX_HEAD_LEN, Request};
pub use response::Response;
pub use status::StatusCode;

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Why a request could not be served.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request")]
    BadRequest,

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    /// The URI tried to leave the document root.
    #[error("path traversal attempt: {0}")]
    Traversal(String),

    /// Not a regular file, or not readable by the server.
    #[error("forbidden: {}", .0.display())]
    Forbidden(PathBuf),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("internal error: {0}")]
    Internal(#[source] io::Error),
}

impl HttpError {
    /// Status to answer with.
    pub fn status(&self) -> StatusCode {
        match self {
            HttpError::BadRequest => StatusCode::BadRequest,
            HttpError::MethodNotAllowed(_) => StatusCode::MethodNotAllowed,
            HttpError::Traversal(_) | HttpError::Forbidden(_) => StatusCode::Forbidden,
            HttpError::NotFound(_) => StatusCode::NotFound,
            HttpError::Internal(_) => StatusCode::InternalServerError,
        }
    }
}

/// What the caller should do with the connection after a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepAlive,
    Close,
}

/// A response that has been decided on but not sent yet.
#[derive(Debug)]
pub struct Reply {
    /// Serialized status line and headers, followed by the body when the
    /// body is held in memory.
    pub head: Vec<u8>,

    /// File to stream after `head`, if any.
    pub body: Option<File>,

    pub disposition: Disposition,
}

impl Reply {
    /// An error page. The connection is closed once it has been sent.
    pub fn error(status: StatusCode) -> Self {
        Self {
            head: Response::error(status).to_bytes(),
            body: None,
            disposition: Disposition::Close,
        }
    }
}

/// Decides the response to one complete request head.
pub fn respond(head: &[u8], document_root: &Path) -> Reply {
    let result = request::parse(head).and_then(|request| {
        if !request.is_get() {
            return Err(HttpError::MethodNotAllowed(request.method));
        }

        debug!(uri = %request.uri, "GET");
        files::open(document_root, &request.uri)
    });

    let err = match result {
        Ok(opened) => {
            debug!(bytes = opened.len, "serving file");
            return Reply {
                head: Response::file(opened.content_type, opened.len).to_bytes(),
                body: Some(opened.file),
                disposition: Disposition::KeepAlive,
            };
        }
        Err(err) => err,
    };

    match &err {
        HttpError::Traversal(uri) => warn!(uri = %uri, "Path traversal attempt blocked"),
        HttpError::Internal(_) => warn!(error = %err, "request failed"),
        _ => debug!(error = %err, "request rejected"),
    }

    Reply::error(err.status())
}
