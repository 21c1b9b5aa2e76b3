//! Storage capability for the flydav file server.
//!
//! The HTTP layer never touches the disk directly. Everything it needs
//! (whole and ranged reads, writes, listings, moves, copies) goes through
//! the [`Storage`] trait, keyed by a logical `/`-separated path rooted at
//! the backend's base. Swapping the local filesystem for another backend
//! (object storage, an in-memory tree for tests) requires no change above
//! this crate.
//!
//! # Backends
//!
//! - [`LocalStorage`]: a directory on the local filesystem (tokio::fs)
//! - [`MemoryStorage`]: a process-local tree, handy for tests
//!
//! # Concurrency
//!
//! Backends provide no locking, isolation, or versioning. Concurrent writers
//! to the same path race at the backend's own atomicity granularity and the
//! last writer wins.

mod error;
mod local;
mod memory;
pub mod path;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde::Serialize;

pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Metadata for a file or directory.
///
/// Always fetched fresh; nothing in the stack caches it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Metadata {
    /// Final path component (empty for the root).
    pub name: String,
    /// Full logical path.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
}

/// Byte-addressable storage keyed by logical path.
#[async_trait]
pub trait Storage: Send + Sync + std::fmt::Debug {
    /// Short backend identifier used in logs.
    fn backend_name(&self) -> &'static str;

    /// Read the whole content of a file.
    async fn read_all(&self, path: &str) -> StorageResult<Bytes>;

    /// Replace the whole content of a file, creating missing parents.
    async fn write_all(&self, path: &str, data: Bytes) -> StorageResult<()>;

    /// Read exactly `length` bytes starting at `offset`.
    ///
    /// A file shorter than `offset + length` is an error, never a short read.
    async fn read(&self, path: &str, offset: u64, length: u64) -> StorageResult<Bytes>;

    /// Write `data` at `offset`, creating the file if it does not exist.
    async fn write(&self, path: &str, offset: u64, data: Bytes) -> StorageResult<()>;

    /// Remove a file, or a directory and everything below it.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Create a directory and any missing parents. Idempotent.
    async fn create_directory(&self, path: &str) -> StorageResult<()>;

    /// Metadata for a single path.
    async fn stat(&self, path: &str) -> StorageResult<Metadata>;

    /// Direct children of a directory, sorted by name.
    async fn list(&self, path: &str) -> StorageResult<Vec<Metadata>>;

    /// Move `src` to `dst`, replacing `dst` and creating its missing parents.
    async fn rename(&self, src: &str, dst: &str) -> StorageResult<()>;

    /// Copy a file or directory tree, replacing `dst`. Returns bytes copied.
    async fn copy(&self, src: &str, dst: &str) -> StorageResult<u64>;

    /// Size of a file in bytes.
    async fn size(&self, path: &str) -> StorageResult<u64> {
        let meta = self.stat(path).await?;
        if meta.is_dir {
            return Err(StorageError::IsADirectory(path.to_string()));
        }
        Ok(meta.size)
    }

    /// Whether anything exists at `path`.
    async fn exists(&self, path: &str) -> StorageResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Concatenate `srcs` in order into `dst` (assembly of chunked uploads).
    async fn merge(&self, srcs: &[String], dst: &str) -> StorageResult<u64> {
        let mut buf = BytesMut::new();
        for src in srcs {
            buf.extend_from_slice(&self.read_all(src).await?);
        }
        let len = buf.len() as u64;
        self.write_all(dst, buf.freeze()).await?;
        Ok(len)
    }
}
