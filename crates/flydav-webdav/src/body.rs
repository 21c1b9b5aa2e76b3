//! Response bodies.
//!
//! Small bodies (listings, errors) are sent whole. File content is streamed
//! from storage in fixed-size chunks, so a response never holds more than
//! one chunk of a file in memory.

use bytes::Bytes;
use flydav_storage::Storage;
use futures::stream;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use std::io;
use std::sync::Arc;

/// Body type of every response the dispatcher produces.
pub type DavBody = UnsyncBoxBody<Bytes, io::Error>;

/// Bytes read from storage per body frame.
pub const CHUNK_SIZE: u64 = 64 * 1024;

/// A body sent in one piece.
pub fn full(data: impl Into<Bytes>) -> DavBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn empty() -> DavBody {
    full(Bytes::new())
}

/// Stream `length` bytes of `key` starting at `offset`.
///
/// A file that shrinks while it is being sent ends the stream with an
/// error; the connection is then aborted rather than padded.
pub fn file(storage: Arc<dyn Storage>, key: String, offset: u64, length: u64) -> DavBody {
    let end = offset + length;
    let chunks = stream::try_unfold(offset, move |pos| {
        let storage = Arc::clone(&storage);
        let key = key.clone();
        async move {
            if pos >= end {
                return Ok(None);
            }
            let want = (end - pos).min(CHUNK_SIZE);
            let data = storage.read(&key, pos, want).await.map_err(io::Error::other)?;
            if data.is_empty() {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{key} ended at byte {pos}"),
                ));
            }
            let next = pos + data.len() as u64;
            Ok(Some((Frame::data(data), next)))
        }
    });
    StreamBody::new(chunks).boxed_unsync()
}
