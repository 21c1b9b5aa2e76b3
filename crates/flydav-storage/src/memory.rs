//! In-memory backend.
//!
//! Behaves like [`LocalStorage`](crate::LocalStorage) (implicit parent
//! creation, recursive delete and copy) but keeps everything in a map, so
//! tests can drive the HTTP layer without a temp directory.

use crate::error::{StorageError, StorageResult};
use crate::{Metadata, Storage, path};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum Node {
    Directory,
    File(Bytes),
}

/// Storage held entirely in process memory.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    /// Normalized path -> node. The root `/` is always present.
    nodes: Arc<RwLock<BTreeMap<String, Node>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty tree containing only the root directory.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            nodes: Arc::new(RwLock::new(nodes)),
        }
    }

    fn metadata(path: &str, node: &Node) -> Metadata {
        Metadata {
            name: path::file_name(path).to_string(),
            path: path.to_string(),
            is_dir: matches!(node, Node::Directory),
            size: match node {
                Node::Directory => 0,
                Node::File(data) => data.len() as u64,
            },
        }
    }

    /// Paths strictly below `dir`.
    fn descendants(nodes: &BTreeMap<String, Node>, dir: &str) -> Vec<String> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.as_str() != dir)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Create every missing ancestor of `path` as a directory.
    fn make_parents(nodes: &mut BTreeMap<String, Node>, path: &str) -> StorageResult<()> {
        let mut ancestors = Vec::new();
        let mut current = path::parent(path);
        while let Some(dir) = current {
            ancestors.push(dir.to_string());
            current = path::parent(dir);
        }
        for dir in ancestors.into_iter().rev() {
            match nodes.get(&dir) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => return Err(StorageError::NotADirectory(dir)),
                None => {
                    nodes.insert(dir, Node::Directory);
                }
            }
        }
        Ok(())
    }

    fn remove_tree(nodes: &mut BTreeMap<String, Node>, path: &str) {
        for child in Self::descendants(nodes, path) {
            nodes.remove(&child);
        }
        nodes.remove(path);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn read_all(&self, logical: &str) -> StorageResult<Bytes> {
        let key = path::normalize(logical)?;
        match self.nodes.read().get(&key) {
            Some(Node::File(data)) => Ok(data.clone()),
            Some(Node::Directory) => Err(StorageError::IsADirectory(key)),
            None => Err(StorageError::NotFound(key)),
        }
    }

    async fn write_all(&self, logical: &str, data: Bytes) -> StorageResult<()> {
        let key = path::normalize(logical)?;
        let mut nodes = self.nodes.write();
        if let Some(Node::Directory) = nodes.get(&key) {
            return Err(StorageError::IsADirectory(key));
        }
        Self::make_parents(&mut nodes, &key)?;
        nodes.insert(key, Node::File(data));
        Ok(())
    }

    async fn read(&self, logical: &str, offset: u64, length: u64) -> StorageResult<Bytes> {
        let data = self.read_all(logical).await?;
        let end = offset.saturating_add(length);
        if end > data.len() as u64 {
            return Err(StorageError::Io {
                path: logical.to_string(),
                source: std::io::ErrorKind::UnexpectedEof.into(),
            });
        }
        Ok(data.slice(offset as usize..end as usize))
    }

    async fn write(&self, logical: &str, offset: u64, data: Bytes) -> StorageResult<()> {
        let key = path::normalize(logical)?;
        let mut nodes = self.nodes.write();
        let mut content = match nodes.get(&key) {
            Some(Node::File(existing)) => BytesMut::from(existing.as_ref()),
            Some(Node::Directory) => return Err(StorageError::IsADirectory(key)),
            None => BytesMut::new(),
        };
        let offset = offset as usize;
        if content.len() < offset + data.len() {
            content.resize(offset + data.len(), 0);
        }
        content[offset..offset + data.len()].copy_from_slice(&data);
        Self::make_parents(&mut nodes, &key)?;
        nodes.insert(key, Node::File(content.freeze()));
        Ok(())
    }

    async fn delete(&self, logical: &str) -> StorageResult<()> {
        let key = path::normalize(logical)?;
        if key == "/" {
            return Err(StorageError::InvalidPath(key));
        }
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&key) {
            return Err(StorageError::NotFound(key));
        }
        Self::remove_tree(&mut nodes, &key);
        Ok(())
    }

    async fn create_directory(&self, logical: &str) -> StorageResult<()> {
        let key = path::normalize(logical)?;
        let mut nodes = self.nodes.write();
        match nodes.get(&key) {
            Some(Node::Directory) => Ok(()),
            Some(Node::File(_)) => Err(StorageError::AlreadyExists(key)),
            None => {
                Self::make_parents(&mut nodes, &key)?;
                nodes.insert(key, Node::Directory);
                Ok(())
            }
        }
    }

    async fn stat(&self, logical: &str) -> StorageResult<Metadata> {
        let key = path::normalize(logical)?;
        self.nodes
            .read()
            .get(&key)
            .map(|node| Self::metadata(&key, node))
            .ok_or(StorageError::NotFound(key))
    }

    async fn list(&self, logical: &str) -> StorageResult<Vec<Metadata>> {
        let key = path::normalize(logical)?;
        let nodes = self.nodes.read();
        match nodes.get(&key) {
            Some(Node::Directory) => {}
            Some(Node::File(_)) => return Err(StorageError::NotADirectory(key)),
            None => return Err(StorageError::NotFound(key)),
        }

        // BTreeMap order is lexical on the full path, which is name order
        // for direct children of one directory.
        let listing = Self::descendants(&nodes, &key)
            .into_iter()
            .filter(|child| path::parent(child) == Some(key.as_str()))
            .filter_map(|child| nodes.get(&child).map(|node| Self::metadata(&child, node)))
            .collect();
        Ok(listing)
    }

    async fn rename(&self, src: &str, dst: &str) -> StorageResult<()> {
        let from = path::normalize(src)?;
        let to = path::normalize(dst)?;
        let mut nodes = self.nodes.write();
        if !nodes.contains_key(&from) {
            return Err(StorageError::NotFound(from));
        }

        let mut moved = vec![(from.clone(), nodes.get(&from).cloned())];
        for child in Self::descendants(&nodes, &from) {
            let node = nodes.get(&child).cloned();
            moved.push((child, node));
        }
        Self::remove_tree(&mut nodes, &from);
        Self::remove_tree(&mut nodes, &to);
        Self::make_parents(&mut nodes, &to)?;
        for (old, node) in moved {
            if let Some(node) = node {
                let new = format!("{to}{}", &old[from.len()..]);
                nodes.insert(new, node);
            }
        }
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> StorageResult<u64> {
        let from = path::normalize(src)?;
        let to = path::normalize(dst)?;
        let mut nodes = self.nodes.write();
        let Some(root) = nodes.get(&from).cloned() else {
            return Err(StorageError::NotFound(from));
        };

        let mut copied = vec![(from.clone(), root)];
        for child in Self::descendants(&nodes, &from) {
            if let Some(node) = nodes.get(&child).cloned() {
                copied.push((child, node));
            }
        }
        Self::remove_tree(&mut nodes, &to);
        Self::make_parents(&mut nodes, &to)?;

        let mut bytes = 0;
        for (old, node) in copied {
            if let Node::File(data) = &node {
                bytes += data.len() as u64;
            }
            nodes.insert(format!("{to}{}", &old[from.len()..]), node);
        }
        Ok(bytes)
    }
}
