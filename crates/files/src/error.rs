//! Error types for the file transfer pipeline.

use thiserror::Error;

/// Result type alias for file transfer operations
pub type FileResult<T> = Result<T, FileError>;

/// Main error type for the file transfer pipeline
#[derive(Debug, Error)]
pub enum FileError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server refused the session or the content.
    #[error("upload rejected: {message}")]
    Rejected { message: String },

    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch { expected: String, computed: String },

    #[error("file too large: {size} bytes exceeds limit of {limit}")]
    TooLarge { size: u64, limit: u64 },

    #[error("encryption error: {0}")]
    Crypto(#[from] frontdesk_crypto::CryptoError),

    #[error("upload session not found: {session_id}")]
    UnknownSession { session_id: String },

    #[error("background task failed: {message}")]
    Task { message: String },
}

impl FileError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    pub fn unknown_session(session_id: impl Into<String>) -> Self {
        Self::UnknownSession {
            session_id: session_id.into(),
        }
    }

    pub fn task(message: impl Into<String>) -> Self {
        Self::Task {
            message: message.into(),
        }
    }
}
