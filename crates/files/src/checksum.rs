//! Content checksums, computed off the event loop.

use bytes::Bytes;
use sha2::{Digest, Sha256};

use crate::error::{FileError, FileResult};

/// Hex-encoded SHA-256 of the content.
pub fn sha256_hex_sync(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// Checksum on a blocking worker so large files never stall event
/// processing.
pub async fn sha256_hex(content: Bytes) -> FileResult<String> {
    tokio::task::spawn_blocking(move || sha256_hex_sync(&content))
        .await
        .map_err(|error| FileError::task(error.to_string()))
}
