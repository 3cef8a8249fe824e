//! REST boundary for file transfers.
//!
//! The HTTP collaborator that owns these endpoints is external; this crate
//! only defines the seam and its reqwest implementation. Every mutating
//! call carries an idempotency key so client retries are never applied
//! twice server-side.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use frontdesk_crypto::Envelope;

use crate::error::FileResult;
use crate::types::SessionStatusResponse;

/// Body of `POST /files/sessions`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub workspace_id: String,
    pub participant_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    pub checksum: String,
    pub encryption_envelope: Envelope,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCreated {
    pub session_id: String,
}

/// Content and session reference for `POST /files/upload`.
#[derive(Debug, Clone)]
pub struct UploadPayload {
    pub session_id: String,
    pub file_name: String,
    pub mime_type: String,
    pub checksum: String,
    pub content: Bytes,
    /// Completed envelope when the content was sealed before transfer.
    pub envelope: Option<Envelope>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub url: String,
    pub preview_url: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileTransferApi: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
        idempotency_key: String,
    ) -> FileResult<SessionCreated>;

    async fn upload(
        &self,
        payload: UploadPayload,
        idempotency_key: String,
    ) -> FileResult<UploadResult>;

    async fn session_status(&self, session_id: String) -> FileResult<SessionStatusResponse>;

    async fn cancel_session(&self, session_id: String) -> FileResult<()>;
}
