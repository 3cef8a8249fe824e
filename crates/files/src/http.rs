//! reqwest implementation of the file-transfer REST boundary.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tracing::debug;

use crate::api::{
    CreateSessionRequest, FileTransferApi, SessionCreated, UploadPayload, UploadResult,
};
use crate::error::FileResult;
use crate::types::SessionStatusResponse;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

pub struct HttpFileTransferApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFileTransferApi {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> FileResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl FileTransferApi for HttpFileTransferApi {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
        idempotency_key: String,
    ) -> FileResult<SessionCreated> {
        debug!(file_name = %request.file_name, "negotiating upload session");
        let created = self
            .client
            .post(self.url("/files/sessions"))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<SessionCreated>()
            .await?;
        Ok(created)
    }

    async fn upload(
        &self,
        payload: UploadPayload,
        idempotency_key: String,
    ) -> FileResult<UploadResult> {
        let mut form = Form::new()
            .text("sessionId", payload.session_id.clone())
            .text("checksum", payload.checksum.clone());

        if let Some(envelope) = &payload.envelope {
            form = form.text("encryptionEnvelope", serde_json::to_string(envelope).unwrap_or_default());
        }

        let part = Part::bytes(payload.content.to_vec())
            .file_name(payload.file_name.clone())
            .mime_str(&payload.mime_type)?;
        form = form.part("file", part);

        debug!(session_id = %payload.session_id, bytes = payload.content.len(), "transferring file content");
        let result = self
            .client
            .post(self.url("/files/upload"))
            .header(IDEMPOTENCY_HEADER, idempotency_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<UploadResult>()
            .await?;
        Ok(result)
    }

    async fn session_status(&self, session_id: String) -> FileResult<SessionStatusResponse> {
        let status = self
            .client
            .get(self.url(&format!("/files/sessions/{session_id}/status")))
            .send()
            .await?
            .error_for_status()?
            .json::<SessionStatusResponse>()
            .await?;
        Ok(status)
    }

    async fn cancel_session(&self, session_id: String) -> FileResult<()> {
        self.client
            .delete(self.url(&format!("/files/sessions/{session_id}")))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
