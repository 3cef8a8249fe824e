//! Orchestration of the two-phase upload protocol.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use frontdesk_crypto::EncryptionCodec;
use frontdesk_messages::{FileAttachment, UploadStatus};
use frontdesk_transport::{EmitHandle, OutboundEvent};

use crate::api::{CreateSessionRequest, FileTransferApi, UploadPayload};
use crate::checksum::{sha256_hex, sha256_hex_sync};
use crate::error::{FileError, FileResult};
use crate::types::{FileMetadata, SessionStatusResponse, UploadSession};

struct ActiveSession {
    cancel: CancellationToken,
    poll_task: Option<JoinHandle<()>>,
}

/// Two-phase upload pipeline.
///
/// Phase one negotiates a server-side session under a deterministic
/// idempotency key; phase two transfers the content. Multiple files may be
/// in flight concurrently, but each session runs its phases strictly in
/// order. Status is observable through push events or, as a fallback,
/// fixed-interval polling that stops on terminal status.
pub struct FileTransferPipeline {
    api: Arc<dyn FileTransferApi>,
    codec: Arc<EncryptionCodec>,
    emitter: EmitHandle,
    workspace_id: String,
    participant_id: String,
    poll_interval: Duration,
    max_upload_bytes: u64,
    active: Mutex<HashMap<String, ActiveSession>>,
}

impl FileTransferPipeline {
    pub fn new(
        api: Arc<dyn FileTransferApi>,
        codec: Arc<EncryptionCodec>,
        emitter: EmitHandle,
        workspace_id: impl Into<String>,
        participant_id: impl Into<String>,
        poll_interval: Duration,
        max_upload_bytes: u64,
    ) -> Self {
        Self {
            api,
            codec,
            emitter,
            workspace_id: workspace_id.into(),
            participant_id: participant_id.into(),
            poll_interval,
            max_upload_bytes,
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Phase one: negotiate an upload session.
    ///
    /// The idempotency key is derived from the identity and the content
    /// fingerprint, so a client retry of the same logical upload can never
    /// create a second server-side session.
    pub async fn create_upload_session(
        &self,
        metadata: FileMetadata,
        content: Bytes,
    ) -> FileResult<UploadSession> {
        if metadata.size > self.max_upload_bytes {
            return Err(FileError::TooLarge {
                size: metadata.size,
                limit: self.max_upload_bytes,
            });
        }

        let checksum = sha256_hex(content).await?;
        let idempotency_key = self.idempotency_key(&metadata, &checksum);
        let envelope = self.codec.prepare_envelope(&idempotency_key);

        let request = CreateSessionRequest {
            workspace_id: self.workspace_id.clone(),
            participant_id: self.participant_id.clone(),
            file_name: metadata.file_name.clone(),
            mime_type: metadata.mime_type.clone(),
            size: metadata.size,
            checksum: checksum.clone(),
            encryption_envelope: envelope.clone(),
        };

        let created = self
            .api
            .create_session(request, idempotency_key.clone())
            .await?;

        self.active
            .lock()
            .entry(created.session_id.clone())
            .or_insert_with(|| ActiveSession {
                cancel: CancellationToken::new(),
                poll_task: None,
            });

        info!(session_id = %created.session_id, file_name = %metadata.file_name, "upload session negotiated");

        Ok(UploadSession {
            session_id: created.session_id,
            workspace_id: self.workspace_id.clone(),
            participant_id: self.participant_id.clone(),
            file_metadata: metadata,
            checksum,
            encryption_envelope: envelope,
            idempotency_key,
        })
    }

    /// Phase two: transfer the content and announce the attachment.
    ///
    /// A network failure here propagates to the caller: a half-created
    /// session must not be treated as success, and the caller retries the
    /// whole two-phase sequence.
    pub async fn upload_file(
        &self,
        session: &UploadSession,
        content: Bytes,
        message_id: &str,
    ) -> FileResult<FileAttachment> {
        let computed = sha256_hex(content.clone()).await?;
        if computed != session.checksum {
            return Err(FileError::ChecksumMismatch {
                expected: session.checksum.clone(),
                computed,
            });
        }

        let (body, envelope) = self.seal(content, session)?;

        let payload = UploadPayload {
            session_id: session.session_id.clone(),
            file_name: session.file_metadata.file_name.clone(),
            mime_type: session.file_metadata.mime_type.clone(),
            checksum: session.checksum.clone(),
            content: body,
            envelope,
        };

        let result = match self
            .api
            .upload(payload, session.idempotency_key.clone())
            .await
        {
            Ok(result) => result,
            Err(error) => {
                self.release(&session.session_id);
                return Err(error);
            }
        };

        let mut attachment = FileAttachment::initiated(
            session.file_metadata.file_name.clone(),
            session.file_metadata.mime_type.clone(),
            session.file_metadata.size,
            session.checksum.clone(),
        );
        attachment.url = Some(result.url);
        attachment.preview_url = result.preview_url;
        attachment.upload_status = UploadStatus::Completed;

        // The remote party learns about the file exactly like a text
        // message: same channel, file-shaped payload.
        let announced = self.emitter.emit(&OutboundEvent::FileMessage {
            message_id: message_id.to_string(),
            attachment: attachment.clone(),
            upload_id: session.session_id.clone(),
        });
        if !announced {
            warn!(
                session_id = %session.session_id,
                "file-message notification dropped: channel not connected"
            );
        }

        self.release(&session.session_id);
        info!(session_id = %session.session_id, "upload completed");
        Ok(attachment)
    }

    /// Fallback status observation: fixed-interval polling.
    ///
    /// Polling stops on terminal status, on cancellation, and when the
    /// receiver is dropped; the timer can never leak.
    pub fn watch_session(&self, session_id: &str) -> mpsc::Receiver<SessionStatusResponse> {
        let (tx, rx) = mpsc::channel(8);

        let mut active = self.active.lock();
        let entry = active
            .entry(session_id.to_string())
            .or_insert_with(|| ActiveSession {
                cancel: CancellationToken::new(),
                poll_task: None,
            });

        let api = Arc::clone(&self.api);
        let cancel = entry.cancel.clone();
        let poll_interval = self.poll_interval;
        let session_id = session_id.to_string();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(session_id, "status polling cancelled");
                        break;
                    }
                    _ = ticker.tick() => {
                        match api.session_status(session_id.clone()).await {
                            Ok(status) => {
                                let terminal = status.is_terminal();
                                if tx.send(status).await.is_err() {
                                    break;
                                }
                                if terminal {
                                    debug!(session_id, "status polling reached terminal state");
                                    break;
                                }
                            }
                            // Poll failures are transient: log and keep
                            // the cadence.
                            Err(error) => warn!(session_id, %error, "status poll failed"),
                        }
                    }
                }
            }
        });

        entry.poll_task = Some(task);
        rx
    }

    /// Best-effort cancellation.
    ///
    /// Stops in-flight polling immediately, asks the server to abandon the
    /// session, and leaves the caller to mark the local attachment failed;
    /// an upload is never left `uploading` forever.
    pub async fn cancel_upload(&self, session_id: &str) {
        let entry = self.active.lock().remove(session_id);
        match entry {
            Some(session) => {
                session.cancel.cancel();
                if let Some(task) = session.poll_task {
                    task.abort();
                }
            }
            None => {
                debug!(session_id, "cancel for unknown session");
            }
        }

        if let Err(error) = self.api.cancel_session(session_id.to_string()).await {
            warn!(session_id, %error, "server-side session cancel failed");
        }
        info!(session_id, "upload cancelled");
    }

    /// Release timers for every in-flight session.
    pub fn shutdown(&self) {
        let mut active = self.active.lock();
        for (_, session) in active.drain() {
            session.cancel.cancel();
            if let Some(task) = session.poll_task {
                task.abort();
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.active.lock().len()
    }

    fn idempotency_key(&self, metadata: &FileMetadata, checksum: &str) -> String {
        let fingerprint = format!(
            "{}:{}:{}:{}:{}",
            self.workspace_id, self.participant_id, metadata.file_name, metadata.size, checksum
        );
        sha256_hex_sync(fingerprint.as_bytes())
    }

    fn seal(
        &self,
        content: Bytes,
        session: &UploadSession,
    ) -> FileResult<(Bytes, Option<frontdesk_crypto::Envelope>)> {
        if self.codec.is_passthrough() {
            return Ok((content, None));
        }
        let envelope = self.codec.encrypt(&content, &session.idempotency_key)?;
        let body = BASE64
            .decode(&envelope.encrypted_content)
            .map_err(|_| frontdesk_crypto::CryptoError::malformed("encryptedContent"))?;
        Ok((Bytes::from(body), Some(envelope)))
    }

    fn release(&self, session_id: &str) {
        if let Some(session) = self.active.lock().remove(session_id) {
            session.cancel.cancel();
            if let Some(task) = session.poll_task {
                task.abort();
            }
        }
    }
}

impl Drop for FileTransferPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
