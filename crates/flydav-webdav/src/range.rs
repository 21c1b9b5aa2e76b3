//! `Range` header resolution.
//!
//! Only the single-range forms `bytes=<start>-<end>` and `bytes=<start>-`
//! are served. Suffix ranges (`bytes=-N`) and multi-range requests are
//! rejected as malformed instead of being partially honoured.

use thiserror::Error;

/// Why a `Range` header could not be served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The header does not follow the accepted grammar.
    #[error("malformed range header: {0:?}")]
    Malformed(String),

    /// The range is well-formed but falls outside the resource.
    #[error("range {start}-{end:?} not satisfiable for size {size}")]
    NotSatisfiable {
        start: u64,
        end: Option<u64>,
        size: u64,
    },
}

/// An inclusive byte span with `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// A validated range always covers at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value for the `Content-Range` response header.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

fn parse_bound(raw: &str, header: &str) -> Result<u64, RangeError> {
    // u64::from_str accepts a leading '+', the grammar does not
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeError::Malformed(header.to_string()));
    }
    raw.parse()
        .map_err(|_| RangeError::Malformed(header.to_string()))
}

/// Resolve a `Range` header value against a resource of `size` bytes.
pub fn parse_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let malformed = || RangeError::Malformed(header.to_string());

    let ranges = header.trim().strip_prefix("bytes=").ok_or_else(malformed)?;
    if ranges.contains(',') {
        return Err(malformed());
    }

    let parts: Vec<&str> = ranges.split('-').collect();
    let [start_raw, end_raw] = parts.as_slice() else {
        return Err(malformed());
    };
    let (start_raw, end_raw) = (start_raw.trim(), end_raw.trim());

    let start = parse_bound(start_raw, header)?;
    let end = if end_raw.is_empty() {
        None
    } else {
        Some(parse_bound(end_raw, header)?)
    };

    if let Some(end) = end
        && start > end
    {
        return Err(malformed());
    }

    let resolved_end = match end {
        Some(end) => end,
        None => size.checked_sub(1).ok_or(RangeError::NotSatisfiable {
            start,
            end,
            size,
        })?,
    };

    if start >= size || resolved_end >= size {
        return Err(RangeError::NotSatisfiable { start, end, size });
    }

    Ok(ByteRange {
        start,
        end: resolved_end,
    })
}
