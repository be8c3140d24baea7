use std::path::Path;

/// Content type for a file, chosen by its extension.
pub fn content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match extension.as_deref() {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        Some("txt") => "text/plain",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type(Path::new("/a/index.html")), "text/html");
        assert_eq!(content_type(Path::new("site.CSS")), "text/css");
        assert_eq!(content_type(Path::new("app.js")), "application/javascript");
        assert_eq!(content_type(Path::new("logo.jpeg")), "image/jpeg");
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(content_type(Path::new("archive.tar.zst")), "application/octet-stream");
        assert_eq!(content_type(Path::new("README")), "application/octet-stream");
    }
}
