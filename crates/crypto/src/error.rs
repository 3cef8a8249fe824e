//! Error types for the encryption codec.

use thiserror::Error;

/// Result type alias for codec operations
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Main error type for the encryption codec
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The envelope was sealed under a different session's key.
    #[error("envelope key mismatch: expected {expected}, found {found}")]
    KeyMismatch { expected: String, found: String },

    #[error("unsupported envelope algorithm: {algorithm}")]
    UnsupportedAlgorithm { algorithm: String },

    /// A field of the envelope failed to decode.
    #[error("malformed envelope field: {field}")]
    Malformed { field: &'static str },

    /// The ciphertext or auth tag does not verify under the session key.
    #[error("envelope failed authentication")]
    AuthenticationFailed,

    #[error("encryption failed: {message}")]
    Encrypt { message: String },
}

impl CryptoError {
    pub fn key_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::KeyMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unsupported_algorithm(algorithm: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm {
            algorithm: algorithm.into(),
        }
    }

    pub fn malformed(field: &'static str) -> Self {
        Self::Malformed { field }
    }

    pub fn encrypt(message: impl Into<String>) -> Self {
        Self::Encrypt {
            message: message.into(),
        }
    }
}
