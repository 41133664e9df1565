//! Centralized error type for the download engine.
//!
//! Workers never panic the process; every failure is a [`DownloadError`]
//! that either retries inside the worker or lands in the session's
//! [`ErrorSlot`].

use std::sync::Mutex;

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DownloadError>;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("link expired: update the download link with 'adam update'")]
    LinkExpired,

    #[error("worker cancelled")]
    Cancelled,

    #[error("server returned unexpected status: {0}")]
    UnexpectedStatus(StatusCode),

    #[error("malformed Content-Range header: {0:?}")]
    MalformedContentRange(String),

    #[error("worker {part} failed after {attempts} retries")]
    RetryExhausted { part: usize, attempts: u32 },

    #[error("merged file is {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("no session found for '{0}'")]
    SessionNotFound(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl DownloadError {
    /// Whether a worker should retry the fetch after this error.
    ///
    /// Transport failures and unexpected statuses are transient; link
    /// expiry, cancellation and exhausted retries short-circuit.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Io(_) | Self::UnexpectedStatus(_) => true,
            Self::LinkExpired
            | Self::Cancelled
            | Self::MalformedContentRange(_)
            | Self::RetryExhausted { .. }
            | Self::SizeMismatch { .. }
            | Self::SessionNotFound(_)
            | Self::Json(_) => false,
        }
    }

}

/// The session's single error, written first-wins under a mutex.
///
/// A [`DownloadError::LinkExpired`] may overwrite an earlier error: it
/// tells the user what to actually do about the failure.
#[derive(Debug, Default)]
pub struct ErrorSlot {
    inner: Mutex<Option<DownloadError>>,
}

impl ErrorSlot {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a worker failure. Returns true if the slot was updated.
    pub fn record(&self, err: DownloadError) -> bool {
        let mut slot = self.inner.lock().unwrap();
        match &*slot {
            None => {
                *slot = Some(err);
                true
            }
            Some(existing)
                if matches!(err, DownloadError::LinkExpired)
                    && !matches!(existing, DownloadError::LinkExpired) =>
            {
                *slot = Some(err);
                true
            }
            Some(_) => false,
        }
    }

    /// Take the recorded error, leaving the slot empty.
    pub fn take(&self) -> Option<DownloadError> {
        self.inner.lock().unwrap().take()
    }
}
