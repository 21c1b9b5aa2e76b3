//! Error type shared by every storage backend.
//!
//! Backends report failures in terms of the logical path the caller asked
//! for, never the backend-specific location, so errors can be logged or
//! surfaced to clients without leaking the storage layout.

use std::io;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The path does not exist.
    #[error("Path not found: {0}")]
    NotFound(String),

    /// Something already occupies the path.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A directory was expected.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// A file was expected.
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// The path is not a valid logical path (e.g. contains `..`).
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Any other I/O failure.
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Classify an I/O error raised while operating on `path`.
    pub fn from_io(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(path.to_string()),
            io::ErrorKind::NotADirectory => StorageError::NotADirectory(path.to_string()),
            io::ErrorKind::IsADirectory => StorageError::IsADirectory(path.to_string()),
            _ => StorageError::Io {
                path: path.to_string(),
                source,
            },
        }
    }

    /// Returns true if this error means the path is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
