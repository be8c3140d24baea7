//! Response rendering.
//!
//! Every response carries `X-Content-Type-Options: nosniff` and
//! `X-Frame-Options: DENY`. Successful responses keep the connection alive;
//! error responses always ask the client to close it.

use super::StatusCode;

/// A response head plus an optional in-memory body.
///
/// File bodies are not held here: the worker sends the head and then streams
/// the file into the socket as send-buffer space frees up.
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Head of a `200 OK` for a body of `content_length` bytes that the
    /// caller will write itself.
    pub fn file(content_type: &str, content_length: u64) -> Self {
        Self::new(StatusCode::Ok)
            .with_header("Content-Type", content_type)
            .with_header("Content-Length", &content_length.to_string())
            .with_security_headers()
            .with_header("Connection", "keep-alive")
    }

    /// A minimal HTML error page. The connection is always closed afterwards.
    pub fn error(status: StatusCode) -> Self {
        let body = format!("<html><body><h1>{status}</h1></body></html>");

        Self::new(status)
            .with_header("Content-Type", "text/html")
            .with_header("Content-Length", &body.len().to_string())
            .with_security_headers()
            .with_header("Connection", "close")
            .with_body(body.into_bytes())
    }

    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }

    fn with_security_headers(self) -> Self {
        self.with_header("X-Content-Type-Options", "nosniff")
            .with_header("X-Frame-Options", "DENY")
    }

    fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Serializes the status line, headers and in-memory body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("HTTP/1.1 {}\r\n", self.status);

        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_format() {
        let bytes = Response::error(StatusCode::NotFound).to_bytes();
        let text = String::from_utf8(bytes).unwrap();

        let body = "<html><body><h1>404 Not Found</h1></body></html>";
        let expected = format!(
            "HTTP/1.1 404 Not Found\r\n\
             Content-Type: text/html\r\n\
             Content-Length: {}\r\n\
             X-Content-Type-Options: nosniff\r\n\
             X-Frame-Options: DENY\r\n\
             Connection: close\r\n\
             \r\n{}",
            body.len(),
            body
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn test_file_head_keeps_alive() {
        let response = Response::file("text/css", 42);
        let text = String::from_utf8(response.to_bytes()).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/css\r\n"));
        assert!(text.contains("Content-Length: 42\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
