//! Local filesystem backend.

use crate::error::{StorageError, StorageResult};
use crate::{Metadata, Storage, path};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, trace};

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    /// Canonical base directory; every logical path resolves below it.
    base_dir: PathBuf,
}

impl LocalStorage {
    /// Open (and create if needed) a storage root at `base_dir`.
    pub async fn new(base_dir: impl AsRef<Path>) -> StorageResult<Self> {
        let base_dir = base_dir.as_ref();
        let display = base_dir.display().to_string();
        fs::create_dir_all(base_dir)
            .await
            .map_err(|e| StorageError::from_io(&display, e))?;
        let base_dir = fs::canonicalize(base_dir)
            .await
            .map_err(|e| StorageError::from_io(&display, e))?;

        debug!(base_dir = %base_dir.display(), "Opened local storage");
        Ok(Self { base_dir })
    }

    /// The canonical base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Map a logical path to a location below the base directory.
    fn resolve(&self, logical: &str) -> StorageResult<PathBuf> {
        let mut real = self.base_dir.clone();
        for part in path::components(logical)? {
            real.push(part);
        }
        Ok(real)
    }

    async fn ensure_parent(&self, logical: &str, real: &Path) -> StorageResult<()> {
        if let Some(parent) = real.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::from_io(logical, e))?;
        }
        Ok(())
    }

    async fn metadata_for(&self, logical: &str, real: &Path) -> StorageResult<Metadata> {
        let meta = fs::metadata(real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        let normalized = path::normalize(logical)?;
        Ok(Metadata {
            name: path::file_name(&normalized).to_string(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            path: normalized,
        })
    }

    /// Copy a directory tree. Iterative to avoid recursive async futures.
    ///
    /// Symbolic links inside the tree are not followed and not copied.
    async fn copy_tree(&self, src: &Path, dst: &Path, logical: &str) -> StorageResult<u64> {
        let mut copied = 0;
        let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];

        while let Some((from, to)) = stack.pop() {
            fs::create_dir_all(&to)
                .await
                .map_err(|e| StorageError::from_io(logical, e))?;
            let mut entries = fs::read_dir(&from)
                .await
                .map_err(|e| StorageError::from_io(logical, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::from_io(logical, e))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::from_io(logical, e))?;
                let target = to.join(entry.file_name());
                if file_type.is_symlink() {
                    debug!(path = %entry.path().display(), "Skipping symlink during copy");
                } else if file_type.is_dir() {
                    stack.push((entry.path(), target));
                } else {
                    copied += fs::copy(entry.path(), &target)
                        .await
                        .map_err(|e| StorageError::from_io(logical, e))?;
                }
            }
        }

        Ok(copied)
    }

    async fn remove_any(&self, logical: &str, real: &Path) -> StorageResult<()> {
        let meta = fs::symlink_metadata(real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        let result = if meta.is_dir() {
            fs::remove_dir_all(real).await
        } else {
            fs::remove_file(real).await
        };
        result.map_err(|e| StorageError::from_io(logical, e))
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn read_all(&self, logical: &str) -> StorageResult<Bytes> {
        let real = self.resolve(logical)?;
        let data = fs::read(&real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        Ok(Bytes::from(data))
    }

    /// Overwrites go through a temp file and rename so readers never see a
    /// half-written file; new files are written directly.
    async fn write_all(&self, logical: &str, data: Bytes) -> StorageResult<()> {
        let real = self.resolve(logical)?;
        self.ensure_parent(logical, &real).await?;

        let exists = fs::metadata(&real).await.is_ok();
        if !exists {
            return fs::write(&real, &data)
                .await
                .map_err(|e| StorageError::from_io(logical, e));
        }

        let parent = real
            .parent()
            .ok_or_else(|| StorageError::InvalidPath(logical.to_string()))?;
        let temp_path = parent.join(format!(".tmp.{}", uuid::Uuid::new_v4()));
        fs::write(&temp_path, &data)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;

        if let Err(e) = fs::rename(&temp_path, &real).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(StorageError::from_io(logical, e));
        }
        trace!(path = %logical, size = data.len(), "Replaced file atomically");
        Ok(())
    }

    async fn read(&self, logical: &str, offset: u64, length: u64) -> StorageResult<Bytes> {
        let real = self.resolve(logical)?;
        let mut file = fs::File::open(&real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;

        let mut buf = vec![0u8; length as usize];
        file.read_exact(&mut buf)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        Ok(Bytes::from(buf))
    }

    async fn write(&self, logical: &str, offset: u64, data: Bytes) -> StorageResult<()> {
        let real = self.resolve(logical)?;
        self.ensure_parent(logical, &real).await?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        file.write_all(&data)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        file.flush()
            .await
            .map_err(|e| StorageError::from_io(logical, e))
    }

    async fn delete(&self, logical: &str) -> StorageResult<()> {
        if path::components(logical)?.is_empty() {
            return Err(StorageError::InvalidPath(logical.to_string()));
        }
        let real = self.resolve(logical)?;
        self.remove_any(logical, &real).await
    }

    async fn create_directory(&self, logical: &str) -> StorageResult<()> {
        let real = self.resolve(logical)?;
        match fs::metadata(&real).await {
            Ok(meta) if meta.is_dir() => return Ok(()),
            Ok(_) => return Err(StorageError::AlreadyExists(logical.to_string())),
            Err(_) => {}
        }
        fs::create_dir_all(&real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))
    }

    async fn stat(&self, logical: &str) -> StorageResult<Metadata> {
        let real = self.resolve(logical)?;
        self.metadata_for(logical, &real).await
    }

    async fn list(&self, logical: &str) -> StorageResult<Vec<Metadata>> {
        let real = self.resolve(logical)?;
        let base = path::normalize(logical)?;

        let mut entries = fs::read_dir(&real)
            .await
            .map_err(|e| StorageError::from_io(logical, e))?;
        let mut listing = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::from_io(logical, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            let child = path::join(&base, &name);
            // Entries can vanish between read_dir and stat under concurrent deletes
            match self.metadata_for(&child, &entry.path()).await {
                Ok(meta) => listing.push(meta),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }

        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    async fn rename(&self, src: &str, dst: &str) -> StorageResult<()> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        fs::metadata(&from)
            .await
            .map_err(|e| StorageError::from_io(src, e))?;
        self.ensure_parent(dst, &to).await?;

        // rename(2) cannot replace a directory or swap file and directory
        if let Ok(meta) = fs::symlink_metadata(&to).await
            && (meta.is_dir() || fs::metadata(&from).await.is_ok_and(|m| m.is_dir()))
        {
            self.remove_any(dst, &to).await?;
        }

        fs::rename(&from, &to)
            .await
            .map_err(|e| StorageError::from_io(dst, e))
    }

    async fn copy(&self, src: &str, dst: &str) -> StorageResult<u64> {
        let from = self.resolve(src)?;
        let to = self.resolve(dst)?;
        let meta = fs::metadata(&from)
            .await
            .map_err(|e| StorageError::from_io(src, e))?;
        self.ensure_parent(dst, &to).await?;

        if fs::symlink_metadata(&to).await.is_ok() {
            self.remove_any(dst, &to).await?;
        }

        if meta.is_dir() {
            self.copy_tree(&from, &to, dst).await
        } else {
            fs::copy(&from, &to)
                .await
                .map_err(|e| StorageError::from_io(dst, e))
        }
    }
}
