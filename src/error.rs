//! Error types for wspserve (§7 "Error handling design").
//!
//! Uses `thiserror` for ergonomic error propagation. `ServerError` is the
//! boundary type the request surface converts to an HTTP status; internal
//! components return the narrower `FetchError` / `ArchiveError`.

use thiserror::Error;

/// Top-level error surfaced to the request handlers.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("encoder failed: {0}")]
    UpstreamFormatError(String),

    #[error("fetch failed: {0}")]
    InternalFetchError(String),

    #[error("index not yet built")]
    IndexUnavailable,
}

impl ServerError {
    /// Maps this error to the HTTP status code §6 specifies.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::UpstreamFormatError(_) => 500,
            Self::InternalFetchError(_) => 500,
            Self::IndexUnavailable => 500,
        }
    }
}

impl From<ArchiveError> for ServerError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::NotFound(p) => Self::NotFound(p),
            other => Self::InternalFetchError(other.to_string()),
        }
    }
}

impl From<FetchError> for ServerError {
    fn from(e: FetchError) -> Self {
        match e {
            FetchError::NotFound(p) => Self::NotFound(p),
            FetchError::BadRequest(m) => Self::BadRequest(m),
            other => Self::InternalFetchError(other.to_string()),
        }
    }
}

/// Errors from the on-disk archive-file backend (§4.H).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArchiveError {
    #[error("no such metric file: {0}")]
    NotFound(String),

    #[error("io error reading {path}: {message}")]
    Io { path: String, message: String },

    #[error("corrupt retention metadata: {0}")]
    CorruptMetadata(String),
}

/// Errors from the fetch engine (§4.E).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("can't open metric {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("no archive covers window for {metric}")]
    NoArchiveCoversWindow { metric: String },

    #[error("corrupt retention metadata for {metric}: {reason}")]
    CorruptMetadata { metric: String, reason: String },

    #[error("render error for {metric}: {reason}")]
    RenderError { metric: String, reason: String },
}

impl From<ArchiveError> for FetchError {
    fn from(e: ArchiveError) -> Self {
        match e {
            ArchiveError::NotFound(p) => Self::NotFound(p),
            ArchiveError::Io { path, message } => Self::RenderError {
                metric: path,
                reason: message,
            },
            ArchiveError::CorruptMetadata(reason) => Self::CorruptMetadata {
                metric: String::new(),
                reason,
            },
        }
    }
}
