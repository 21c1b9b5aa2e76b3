//! Static web UI mount.
//!
//! Serves a directory of static assets (a browser front end for the
//! listing API) under its own URL prefix, ahead of the WebDAV dispatcher.
//! Only `GET` and `HEAD` are claimed; assets are public and need no
//! credentials.

use crate::body::{self, DavBody};
use crate::error::DavResult;
use crate::paths;
use flydav_storage::{LocalStorage, Storage, StorageResult, path};
use hyper::header::{self, HeaderValue};
use hyper::{Method, Response, StatusCode};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

const INDEX: &str = "index.html";

/// A static asset directory mounted at a URL prefix.
#[derive(Debug, Clone)]
pub struct UiMount {
    prefix: String,
    storage: Arc<dyn Storage>,
}

impl UiMount {
    pub fn new(prefix: &str, storage: Arc<dyn Storage>) -> Self {
        Self {
            prefix: paths::clean(prefix),
            storage,
        }
    }

    /// Mount the directory `source` at `prefix`.
    pub async fn open(prefix: &str, source: &Path) -> StorageResult<Self> {
        let storage = LocalStorage::new(source).await?;
        Ok(Self::new(prefix, Arc::new(storage)))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether this mount answers the request.
    pub fn claims(&self, method: &Method, raw_path: &str) -> bool {
        (method == Method::GET || method == Method::HEAD)
            && paths::strip_mount_prefix(raw_path, &self.prefix).is_some()
    }

    pub async fn serve(&self, raw_path: &str, head_only: bool) -> DavResult<Response<DavBody>> {
        let mut key = paths::request_path(raw_path, &self.prefix)?;
        let mut meta = self.storage.stat(&key).await?;
        if meta.is_dir {
            key = path::join(&key, INDEX);
            meta = self.storage.stat(&key).await?;
        }
        debug!(asset = %key, size = meta.size, "serving ui asset");

        let body = if head_only {
            body::empty()
        } else {
            body::file(Arc::clone(&self.storage), key.clone(), 0, meta.size)
        };
        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::OK;
        let h = response.headers_mut();
        h.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(content_type(&key)),
        );
        h.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));
        Ok(response)
    }
}

fn content_type(key: &str) -> &'static str {
    let ext = paths::file_name(key)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "ico" => "image/x-icon",
        "wasm" => "application/wasm",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
