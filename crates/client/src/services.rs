//! Engine wiring and the inbound-event → store glue.

use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use frontdesk_config::AppConfig;
use frontdesk_crypto::{EncryptionCodec, Envelope};
use frontdesk_files::{FileMetadata, FileResult, FileTransferApi, FileTransferPipeline, HttpFileTransferApi};
use frontdesk_messages::{
    FileAttachment, Message, MessageLifecycleStore, Sender, SenderKind, TypingPresenceTracker,
    TypingSignal, UploadStatus,
};
use frontdesk_transport::{
    ConnectConfig, ConnectionManager, DeliveredReceipt, EmitHandle, InboundEvent,
    InboundEventKind, OutboundEvent, Transport, WsTransport,
};

const TYPING_SIGNAL_BUFFER: usize = 32;

/// Who this engine instance is acting as.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub workspace_id: String,
    pub participant_id: String,
    pub display_name: String,
    pub kind: SenderKind,
}

/// Result of an optimistic send.
///
/// `emitted == false` means the transport was down and the payload was
/// dropped; the message stays `sent` locally and the caller owns the
/// retry.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message_id: String,
    pub emitted: bool,
}

/// The assembled engine.
///
/// Constructed exactly once by the application root and passed by
/// reference to consumers; there is deliberately no global accessor.
pub struct ClientServices {
    identity: ClientIdentity,
    pub manager: Arc<ConnectionManager>,
    pub store: Arc<Mutex<MessageLifecycleStore>>,
    pub typing: Arc<TypingPresenceTracker>,
    pub pipeline: Arc<FileTransferPipeline>,
    message_codec: Arc<EncryptionCodec>,
    typing_pump: JoinHandle<()>,
}

impl ClientServices {
    /// Wire the engine against the default WebSocket transport and HTTP
    /// file boundary.
    pub fn initialise(config: &AppConfig, identity: ClientIdentity) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(WsTransport::new());
        let api: Arc<dyn FileTransferApi> = Arc::new(HttpFileTransferApi::new(
            config.server.files_base_url.clone(),
            Duration::from_secs(config.server.request_timeout_seconds),
        )?);
        Ok(Self::initialise_with(config, identity, transport, api))
    }

    /// Wire the engine against injected boundary implementations.
    pub fn initialise_with(
        config: &AppConfig,
        identity: ClientIdentity,
        transport: Arc<dyn Transport>,
        api: Arc<dyn FileTransferApi>,
    ) -> Self {
        let passthrough = !config.encryption.enabled;
        let message_codec = Arc::new(EncryptionCodec::for_messages(passthrough));
        let file_codec = Arc::new(EncryptionCodec::for_files(passthrough));

        let manager = Arc::new(ConnectionManager::new(
            config.server.ws_url.clone(),
            transport,
        ));

        let store = Arc::new(Mutex::new(MessageLifecycleStore::new(
            identity.participant_id.clone(),
        )));

        let (typing_tx, typing_rx) = mpsc::channel::<TypingSignal>(TYPING_SIGNAL_BUFFER);
        let typing = Arc::new(TypingPresenceTracker::new(
            typing_tx,
            Duration::from_millis(config.typing.debounce_ms),
            Duration::from_millis(config.typing.idle_stop_ms),
            Duration::from_millis(config.typing.ttl_ms),
        ));

        let pipeline = Arc::new(FileTransferPipeline::new(
            api,
            file_codec,
            manager.emit_handle(),
            identity.workspace_id.clone(),
            identity.participant_id.clone(),
            Duration::from_millis(config.files.poll_interval_ms),
            config.files.max_upload_bytes,
        ));

        let typing_pump = spawn_typing_pump(typing_rx, manager.emit_handle());

        register_glue(
            &manager,
            Arc::clone(&store),
            Arc::clone(&typing),
            Arc::clone(&message_codec),
            manager.emit_handle(),
            identity.participant_id.clone(),
        );

        info!(
            workspace_id = %identity.workspace_id,
            participant_id = %identity.participant_id,
            "engine services initialised"
        );

        Self {
            identity,
            manager,
            store,
            typing,
            pipeline,
            message_codec,
            typing_pump,
        }
    }

    pub fn identity(&self) -> &ClientIdentity {
        &self.identity
    }

    /// Open the realtime channel. Returns `false` when config was
    /// incomplete or the transport could not be established.
    pub async fn connect(&self, token: &str) -> bool {
        self.manager
            .connect(ConnectConfig {
                workspace_id: self.identity.workspace_id.clone(),
                participant_id: self.identity.participant_id.clone(),
                token: token.to_string(),
            })
            .await
            .is_some()
    }

    /// Optimistically append and emit a text message.
    pub fn send_message(&self, room_id: &str, content: &str) -> SendOutcome {
        let message = Message::outgoing(room_id, content, self.sender());
        let message_id = message.id.clone();
        self.store.lock().append_local(message);

        let wire_content = self.encode_content(room_id, content);
        let emitted = self.manager.emit(&OutboundEvent::Message {
            room_id: room_id.to_string(),
            message_id: message_id.clone(),
            message: wire_content,
            sender_id: self.identity.participant_id.clone(),
            sender_name: self.identity.display_name.clone(),
            sender_type: self.identity.kind,
        });
        if !emitted {
            debug!(room_id, message_id, "send while disconnected: local append only");
        }
        SendOutcome {
            message_id,
            emitted,
        }
    }

    /// Mark the conversation read locally and acknowledge the exact id
    /// list to the remote side.
    pub fn mark_room_read(&self, room_id: &str) -> Vec<String> {
        let (ids, receipts) = {
            let mut store = self.store.lock();
            let ids = store.mark_all_read(room_id);
            let receipts: Vec<DeliveredReceipt> = store
                .messages(room_id)
                .iter()
                .filter(|message| ids.contains(&message.id))
                .map(|message| DeliveredReceipt {
                    message_id: message.id.clone(),
                    sender_id: message.sender.id.clone(),
                })
                .collect();
            (ids, receipts)
        };

        if !receipts.is_empty() {
            let emitted = self.manager.emit(&OutboundEvent::MessageDelivered {
                messages: receipts,
                room_id: room_id.to_string(),
            });
            if !emitted {
                debug!(room_id, "read acknowledgement dropped: channel not connected");
            }
        }
        ids
    }

    /// Record local typing; the tracker debounces and auto-stops, and its
    /// signals are pumped onto the channel.
    pub fn set_typing(&self, room_id: &str, is_typing: bool) {
        self.typing
            .set_typing(room_id, &self.identity.participant_id, is_typing);
    }

    /// Send a file: optimistic message with an `initiated` attachment,
    /// then the two-phase transfer populating it asynchronously.
    pub async fn send_file(
        &self,
        room_id: &str,
        metadata: FileMetadata,
        content: Bytes,
    ) -> FileResult<String> {
        let mut message = Message::outgoing(room_id, metadata.file_name.clone(), self.sender());
        let message_id = message.id.clone();
        message.attachment = Some(FileAttachment::initiated(
            metadata.file_name.clone(),
            metadata.mime_type.clone(),
            metadata.size,
            String::new(),
        ));
        self.store.lock().append_local(message);

        let session = match self
            .pipeline
            .create_upload_session(metadata.clone(), content.clone())
            .await
        {
            Ok(session) => session,
            Err(error) => {
                self.fail_attachment(room_id, &message_id);
                return Err(error);
            }
        };

        let mut uploading = FileAttachment::initiated(
            metadata.file_name,
            metadata.mime_type,
            metadata.size,
            session.checksum.clone(),
        );
        uploading.upload_status = UploadStatus::Uploading;
        self.store
            .lock()
            .set_attachment(room_id, &message_id, uploading);

        match self.pipeline.upload_file(&session, content, &message_id).await {
            Ok(attachment) => {
                self.store
                    .lock()
                    .set_attachment(room_id, &message_id, attachment);
                Ok(message_id)
            }
            Err(error) => {
                self.fail_attachment(room_id, &message_id);
                Err(error)
            }
        }
    }

    /// Abandon an in-flight upload; the message's attachment is reverted
    /// to `failed` rather than left `uploading` forever.
    pub async fn cancel_upload(&self, room_id: &str, message_id: &str, session_id: &str) {
        self.pipeline.cancel_upload(session_id).await;
        self.fail_attachment(room_id, message_id);
    }

    /// Close the channel and release every timer the engine owns.
    pub async fn shutdown(&self) {
        self.manager.disconnect().await;
        self.typing.shutdown();
        self.pipeline.shutdown();
        self.typing_pump.abort();
        info!("engine services shut down");
    }

    fn sender(&self) -> Sender {
        Sender {
            kind: self.identity.kind,
            id: self.identity.participant_id.clone(),
        }
    }

    fn encode_content(&self, room_id: &str, content: &str) -> String {
        match self.message_codec.encrypt(content.as_bytes(), room_id) {
            Ok(envelope) => {
                serde_json::to_string(&envelope).unwrap_or_else(|_| content.to_string())
            }
            Err(error) => {
                warn!(room_id, %error, "content encryption failed, sending plaintext");
                content.to_string()
            }
        }
    }

    fn fail_attachment(&self, room_id: &str, message_id: &str) {
        let mut store = self.store.lock();
        let existing = store
            .messages(room_id)
            .iter()
            .find(|message| message.id == message_id)
            .and_then(|message| message.attachment.clone());
        if let Some(mut attachment) = existing {
            attachment.upload_status = UploadStatus::Failed;
            store.set_attachment(room_id, message_id, attachment);
        }
    }
}

impl Drop for ClientServices {
    fn drop(&mut self) {
        self.typing_pump.abort();
    }
}

fn spawn_typing_pump(
    mut signals: mpsc::Receiver<TypingSignal>,
    emitter: EmitHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            let emitted = emitter.emit(&OutboundEvent::Typing {
                room_id: signal.room_id.clone(),
                is_typing: signal.is_typing,
            });
            if !emitted {
                debug!(room_id = %signal.room_id, "typing signal dropped: channel not connected");
            }
        }
    })
}

/// Subscribe the store and tracker to the channel.
///
/// Handlers absorb their own failures; a bad event is logged and never
/// stops delivery of the rest.
fn register_glue(
    manager: &ConnectionManager,
    store: Arc<Mutex<MessageLifecycleStore>>,
    typing: Arc<TypingPresenceTracker>,
    codec: Arc<EncryptionCodec>,
    emitter: EmitHandle,
    local_participant_id: String,
) {
    {
        let store = Arc::clone(&store);
        let codec = Arc::clone(&codec);
        let emitter = emitter.clone();
        let local = local_participant_id.clone();
        manager.add_event_listener(InboundEventKind::NewMessage, move |event| {
            let InboundEvent::NewMessage {
                room_id,
                message_id,
                message,
                sender_id,
                sender_type,
                created_at,
                ..
            } = event
            else {
                return Ok(());
            };

            let content = decode_content(&codec, room_id, message);
            let incoming = Message::incoming(
                message_id.clone(),
                room_id.clone(),
                content,
                Sender {
                    kind: *sender_type,
                    id: sender_id.clone(),
                },
                (*created_at).unwrap_or_else(chrono::Utc::now),
            );
            store.lock().append_remote(incoming);

            // Acknowledge receipt, except for echoes of our own sends.
            if sender_id != &local {
                let emitted = emitter.emit(&OutboundEvent::MessageDelivered {
                    messages: vec![DeliveredReceipt {
                        message_id: message_id.clone(),
                        sender_id: sender_id.clone(),
                    }],
                    room_id: room_id.clone(),
                });
                if !emitted {
                    debug!(room_id = %room_id, "delivered receipt dropped: channel not connected");
                }
            }
            Ok(())
        });
    }

    {
        let store = Arc::clone(&store);
        manager.add_event_listener(InboundEventKind::MessageAck, move |event| {
            if let InboundEvent::MessageAck {
                room_id,
                message_id,
                sent_at,
            } = event
            {
                store.lock().apply_ack(room_id, message_id, *sent_at);
            }
            Ok(())
        });
    }

    {
        let store = Arc::clone(&store);
        manager.add_event_listener(InboundEventKind::DeliveredTo, move |event| {
            if let InboundEvent::DeliveredTo {
                room_id,
                message_id,
                delivered_at,
            } = event
            {
                store.lock().apply_delivered(room_id, message_id, *delivered_at);
            }
            Ok(())
        });
    }

    {
        let store = Arc::clone(&store);
        manager.add_event_listener(InboundEventKind::MessagesRead, move |event| {
            if let InboundEvent::MessagesRead {
                room_id,
                message_ids,
                read_at,
            } = event
            {
                store.lock().apply_read(room_id, message_ids, *read_at);
            }
            Ok(())
        });
    }

    for kind in [InboundEventKind::ClientTyping, InboundEventKind::AgentTyping] {
        let typing = Arc::clone(&typing);
        let local = local_participant_id.clone();
        manager.add_event_listener(kind, move |event| {
            let (room_id, participant_id, is_typing) = match event {
                InboundEvent::ClientTyping {
                    room_id,
                    participant_id,
                    is_typing,
                }
                | InboundEvent::AgentTyping {
                    room_id,
                    participant_id,
                    is_typing,
                } => (room_id, participant_id, *is_typing),
                _ => return Ok(()),
            };
            // The server may broadcast our own typing back to us.
            if participant_id != &local {
                typing.observe(room_id, participant_id, is_typing);
            }
            Ok(())
        });
    }

    {
        let store = Arc::clone(&store);
        manager.add_event_listener(InboundEventKind::ParticipantDisconnected, move |event| {
            if let InboundEvent::ParticipantDisconnected {
                room_id,
                participant_id,
            } = event
            {
                store
                    .lock()
                    .insert_system_notice(room_id, format!("{participant_id} left the conversation"));
            }
            Ok(())
        });
    }
}

fn decode_content(codec: &EncryptionCodec, room_id: &str, raw: &str) -> String {
    let Ok(envelope) = serde_json::from_str::<Envelope>(raw) else {
        // Plain content from peers that do not wrap envelopes.
        return raw.to_string();
    };
    match codec.decrypt(&envelope, room_id) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(error) => {
            warn!(room_id, %error, "failed to open message envelope");
            raw.to_string()
        }
    }
}
