//! Data model for upload sessions.

use frontdesk_crypto::Envelope;
use frontdesk_messages::UploadStatus;
use serde::{Deserialize, Serialize};

/// Metadata describing the file being transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
}

/// A negotiated upload session.
///
/// Short-lived: destroyed on completion, cancellation, or timeout. There
/// is exactly one active session per in-flight file, and the idempotency
/// key makes retried negotiations land on the same server-side session.
#[derive(Debug, Clone)]
pub struct UploadSession {
    pub session_id: String,
    pub workspace_id: String,
    pub participant_id: String,
    pub file_metadata: FileMetadata,
    /// Hex-encoded SHA-256 of the full file content.
    pub checksum: String,
    pub encryption_envelope: Envelope,
    pub idempotency_key: String,
}

/// Status payload returned by `GET /files/sessions/:id/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: String,
    pub status: UploadStatus,
    pub url: Option<String>,
    pub preview_url: Option<String>,
}

impl SessionStatusResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, UploadStatus::Completed | UploadStatus::Failed)
    }
}
