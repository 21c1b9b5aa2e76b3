//! Logical path helpers.
//!
//! A logical path is `/`-separated and rooted at the backend base. Backends
//! accept paths with or without a leading slash but reject any `..`
//! component outright; resolving traversal is the caller's job.

use crate::error::{StorageError, StorageResult};

/// Split a logical path into its components.
///
/// Empty and `.` components are dropped. `..` is rejected.
pub fn components(path: &str) -> StorageResult<Vec<&str>> {
    let mut parts = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => return Err(StorageError::InvalidPath(path.to_string())),
            p if p.contains('\0') => return Err(StorageError::InvalidPath(path.to_string())),
            p => parts.push(p),
        }
    }
    Ok(parts)
}

/// Normalize a logical path to the `/a/b` form (`/` for the root).
pub fn normalize(path: &str) -> StorageResult<String> {
    let parts = components(path)?;
    Ok(format!("/{}", parts.join("/")))
}

/// Parent of a normalized path, or `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Final component of a normalized path (empty for the root).
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Join a child name onto a normalized path.
pub fn join(base: &str, name: &str) -> String {
    if base == "/" {
        format!("/{name}")
    } else {
        format!("{}/{name}", base.trim_end_matches('/'))
    }
}
