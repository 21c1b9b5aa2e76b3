//! Request path handling.
//!
//! Turns the raw URI path (or a `Destination` header) into the canonical,
//! principal-relative path the authorization engine expects, and maps that
//! onto a storage key under the principal's root directory.

use crate::error::{DavError, DavResult};
use percent_encoding::percent_decode_str;
use url::Url;

/// Lexically clean a path, rooted at `/`.
///
/// Collapses duplicate separators, drops `.` segments and resolves `..`
/// against the preceding segment. `..` at the root stays at the root, so
/// the result can never escape `/`.
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for seg in path.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Strip the mount prefix from a path, respecting segment boundaries.
pub fn strip_mount_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Percent-decode a URI path.
fn decode(raw: &str) -> DavResult<String> {
    percent_decode_str(raw)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| DavError::BadRequest(format!("path is not valid UTF-8: {raw}")))
}

/// Canonical principal-relative path for a raw URI path.
pub fn request_path(raw: &str, mount_prefix: &str) -> DavResult<String> {
    let decoded = decode(raw)?;
    if decoded.contains('\0') {
        return Err(DavError::BadRequest("path contains NUL".to_string()));
    }
    let relative = strip_mount_prefix(&decoded, mount_prefix)
        .ok_or_else(|| DavError::NotFound(decoded.clone()))?;
    Ok(clean(relative))
}

/// Canonical principal-relative path named by a `Destination` header.
///
/// Accepts an absolute URL (`http://host/prefix/path`) or an absolute path.
pub fn destination_path(header: &str, mount_prefix: &str) -> DavResult<String> {
    let header = header.trim();
    let raw_path = if header.starts_with('/') {
        header
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string()
    } else {
        let url = Url::parse(header)
            .map_err(|e| DavError::BadRequest(format!("invalid Destination {header:?}: {e}")))?;
        url.path().to_string()
    };

    request_path(&raw_path, mount_prefix).map_err(|e| match e {
        DavError::NotFound(p) => DavError::BadRequest(format!("Destination outside mount: {p}")),
        other => other,
    })
}

/// Storage key for a principal-relative path.
pub fn storage_key(root_dir: &str, path: &str) -> String {
    let root = root_dir.trim_end_matches('/');
    if path == "/" {
        if root.is_empty() { "/".to_string() } else { root.to_string() }
    } else {
        format!("{root}{path}")
    }
}

/// Whether `inner` is `outer` or lies below it.
pub fn is_within(outer: &str, inner: &str) -> bool {
    crate::access::scope_matches(outer, inner)
}

/// Final segment of a canonical path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}
