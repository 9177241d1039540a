//! Error types for the uploader.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Problems with the run configuration, reported before any work starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Directory does not exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Directory is not readable: {}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No JPEG photos found under {}", .0.display())]
    NoCandidates(PathBuf),

    #[error("Failed to read password")]
    Prompt(#[source] io::Error),
}

/// A network-level failure that may succeed when tried again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransientError(pub String);

impl From<reqwest::Error> for TransientError {
    fn from(e: reqwest::Error) -> Self {
        TransientError(e.to_string())
    }
}

/// Fatal authentication failure. No upload is attempted after one of these.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Credentials rejected: {0}")]
    Rejected(String),

    #[error("Verification code rejected")]
    SecondFactorRejected,

    #[error("Service unreachable after {attempts} attempts")]
    Transient {
        attempts: u32,
        #[source]
        source: TransientError,
    },

    #[error("Failed to read verification code")]
    Prompt(#[source] io::Error),
}

/// Failure to look up or create a collection.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service returned HTTP {status}: {reason}")]
    Status { status: u16, reason: String },

    #[error("Not signed in")]
    NotAuthenticated,
}

/// Per-file upload failure. Recorded against the task and never fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error("photo already exists remotely")]
    Duplicate,

    #[error("malformed file: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("server error (HTTP {status}): {reason}")]
    Server { status: u16, reason: String },

    #[error("failed to read file: {0}")]
    Io(String),

    #[error("not signed in")]
    NotAuthenticated,

    #[error("upload aborted: {0}")]
    Aborted(String),
}

impl UploadError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::Network(_) | UploadError::Server { .. })
    }
}

impl From<io::Error> for UploadError {
    fn from(e: io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}
