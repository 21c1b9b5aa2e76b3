//! Error handling and mapping to HTTP status codes.
//!
//! Every failure in the dispatcher becomes a [`DavError`], and every
//! `DavError` has exactly one status code. Storage errors are classified
//! by kind; anything unclassified is a server error.

use crate::range::RangeError;
use flydav_storage::StorageError;
use hyper::StatusCode;
use thiserror::Error;

/// Errors surfaced to HTTP clients.
#[derive(Debug, Error)]
pub enum DavError {
    /// Missing or invalid credentials.
    #[error("Authentication required")]
    Unauthorized,

    /// Authenticated, but no scope grants the permission.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// The resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request is malformed (bad path, bad Destination, ...).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The `Range` header does not follow the accepted grammar.
    #[error("Malformed range header: {0}")]
    MalformedRange(String),

    /// The `Range` header falls outside the resource.
    #[error("Range not satisfiable for resource of {size} bytes")]
    RangeNotSatisfiable { size: u64 },

    /// The verb is not supported.
    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    /// The target conflicts with existing state (e.g. PUT onto a directory).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request body exceeds the configured upload limit.
    #[error("Payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    /// `Overwrite: F` and the destination exists.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Failure inside the server itself (response assembly, task join).
    #[error("Internal error: {0}")]
    Internal(String),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl DavError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            DavError::Unauthorized => StatusCode::UNAUTHORIZED,
            DavError::Forbidden(_) => StatusCode::FORBIDDEN,
            DavError::NotFound(_) => StatusCode::NOT_FOUND,
            DavError::BadRequest(_) | DavError::MalformedRange(_) => StatusCode::BAD_REQUEST,
            DavError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            DavError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            DavError::Conflict(_) => StatusCode::CONFLICT,
            DavError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            DavError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DavError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DavError::Storage(e) => storage_status(e),
        }
    }
}

/// Map a storage error to an HTTP status.
pub fn storage_status(e: &StorageError) -> StatusCode {
    match e {
        StorageError::NotFound(_) => StatusCode::NOT_FOUND,
        StorageError::AlreadyExists(_)
        | StorageError::NotADirectory(_)
        | StorageError::IsADirectory(_) => StatusCode::CONFLICT,
        StorageError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        StorageError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<RangeError> for DavError {
    fn from(e: RangeError) -> Self {
        match e {
            RangeError::Malformed(header) => DavError::MalformedRange(header),
            RangeError::NotSatisfiable { size, .. } => DavError::RangeNotSatisfiable { size },
        }
    }
}

/// Result type for dispatcher operations.
pub type DavResult<T> = Result<T, DavError>;
