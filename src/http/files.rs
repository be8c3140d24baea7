//! Static file resolution and serving.
//!
//! URIs map onto the document root as follows:
//!
//! | URI                               | File                        |
//! |-----------------------------------|-----------------------------|
//! | `/`                               | `index.html`                |
//! | `/images/*`, `/static/*`          | the path verbatim           |
//! | ends in `.html`, `.css` or `.js`  | the path verbatim           |
//! | anything else                     | the path with `.html` added |
//!
//! Containment is checked twice. Any `..` segment is refused before the
//! filesystem is touched. The mapped path is then canonicalized and must be
//! a descendant of the (canonical) document root, compared component by
//! component so that `root_secret` never passes for `root`.

use super::{HttpError, mime};

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Maps a request URI to a path relative to the document root.
pub fn map_uri(uri: &str) -> String {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);

    if path == "/" {
        return "index.html".to_string();
    }

    let relative = path.trim_start_matches('/');

    if path.starts_with("/images/") || path.starts_with("/static/") {
        return relative.to_string();
    }

    if [".html", ".css", ".js"].iter().any(|ext| path.ends_with(ext)) {
        relative.to_string()
    } else {
        format!("{relative}.html")
    }
}

/// Resolves `uri` to a canonical file path inside `document_root`.
///
/// `document_root` must already be canonical.
pub fn resolve(document_root: &Path, uri: &str) -> Result<PathBuf, HttpError> {
    if uri.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(HttpError::Traversal(uri.to_string()));
    }

    let candidate = document_root.join(map_uri(uri));

    let canonical = fs::canonicalize(&candidate).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => HttpError::Forbidden(candidate.clone()),
        _ => HttpError::NotFound(candidate.clone()),
    })?;

    if !canonical.starts_with(document_root) {
        return Err(HttpError::Traversal(uri.to_string()));
    }

    Ok(canonical)
}

/// An opened file, ready to be sent as a response body.
#[derive(Debug)]
pub struct StaticFile {
    pub file: File,
    pub len: u64,
    pub content_type: &'static str,
}

/// Opens the regular file addressed by `uri`.
pub fn open(document_root: &Path, uri: &str) -> Result<StaticFile, HttpError> {
    let path = resolve(document_root, uri)?;

    let metadata = fs::metadata(&path).map_err(HttpError::Internal)?;
    if !metadata.is_file() {
        return Err(HttpError::Forbidden(path));
    }

    let file = File::open(&path).map_err(|e| match e.kind() {
        io::ErrorKind::PermissionDenied => HttpError::Forbidden(path.clone()),
        _ => HttpError::Internal(e),
    })?;

    Ok(StaticFile {
        file,
        len: metadata.len(),
        content_type: mime::content_type(&path),
    })
}
