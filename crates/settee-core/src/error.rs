//! Store error handling
//!
//! Provides typed errors for document operations. Every failure the server
//! can report is folded into one of a small set of kinds so callers can
//! decide whether to retry, ignore, or surface it.

use thiserror::Error;

/// Errors that can occur while talking to the document database
#[derive(Error, Debug)]
pub enum StoreError {
    /// Document or revision does not exist
    #[error("Not found: '{location}'")]
    NotFound { location: String },

    /// Revision mismatch reported by the server
    #[error("Document update conflict at '{location}': {reason}")]
    Conflict { location: String, reason: String },

    /// Server answered with an unexpected status
    #[error("Request to '{location}' failed{}: {message}", status_suffix(.status))]
    Transport {
        location: String,
        status: Option<u16>,
        message: String,
    },

    /// HTTP client failure (connection refused, timeout, TLS, ...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response decoded but did not have the expected shape
    #[error("Invalid response from '{location}': {details}")]
    InvalidResponse { location: String, details: String },

    /// Identifier cannot be used as a document id
    #[error("Invalid document id '{id}': {reason}")]
    InvalidId { id: String, reason: String },
}

/// Coarse classification of a [`StoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Target document or revision does not exist
    NotFound,
    /// Optimistic-concurrency violation
    Conflict,
    /// Any other communication failure
    Transport,
    /// Identifier rejected before reaching the server
    InvalidId,
}

impl StoreError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound { .. } => ErrorKind::NotFound,
            StoreError::Conflict { .. } => ErrorKind::Conflict,
            StoreError::InvalidId { .. } => ErrorKind::InvalidId,
            StoreError::Transport { .. }
            | StoreError::Http(_)
            | StoreError::Json(_)
            | StoreError::InvalidResponse { .. } => ErrorKind::Transport,
        }
    }

    /// Check if this error means the target is gone
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// Check if retrying the same request could succeed
    ///
    /// Conflicts need a fresh revision first, so they are not retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Http(e) => e.is_timeout() || e.is_connect(),
            StoreError::Transport { status, .. } => {
                status.map_or(true, |s| s >= 500 || s == 429)
            }
            _ => false,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status
        .map(|s| format!(" with status {}", s))
        .unwrap_or_default()
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
