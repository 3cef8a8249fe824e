//! End-to-end scenarios for the assembled engine: the glue between the
//! channel, the lifecycle store, typing presence and the reconnection
//! coordinator, all over an in-memory transport.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;

use frontdesk_client::{ClientIdentity, ClientServices, ReconnectState, ReconnectionCoordinator};
use frontdesk_config::AppConfig;
use frontdesk_crypto::EncryptionCodec;
use frontdesk_files::{
    CreateSessionRequest, FileMetadata, FileResult, FileTransferApi, SessionCreated,
    SessionStatusResponse, UploadPayload, UploadResult,
};
use frontdesk_messages::{DeliveryStatus, SenderKind, UploadStatus};
use frontdesk_transport::{
    ChannelTransport, InboundEvent, RoomInfo, Transport, TransportPeer, TransportStatus,
};

/// Always-succeeding REST boundary for tests that exercise the channel.
struct StubFileApi;

#[async_trait]
impl FileTransferApi for StubFileApi {
    async fn create_session(
        &self,
        _request: CreateSessionRequest,
        _idempotency_key: String,
    ) -> FileResult<SessionCreated> {
        Ok(SessionCreated {
            session_id: "stub-session".to_string(),
        })
    }

    async fn upload(
        &self,
        _payload: UploadPayload,
        _idempotency_key: String,
    ) -> FileResult<UploadResult> {
        Ok(UploadResult {
            url: "https://cdn.test/stub".to_string(),
            preview_url: None,
        })
    }

    async fn session_status(&self, session_id: String) -> FileResult<SessionStatusResponse> {
        Ok(SessionStatusResponse {
            session_id,
            status: frontdesk_messages::UploadStatus::Completed,
            url: Some("https://cdn.test/stub".to_string()),
            preview_url: None,
        })
    }

    async fn cancel_session(&self, _session_id: String) -> FileResult<()> {
        Ok(())
    }
}

fn identity() -> ClientIdentity {
    ClientIdentity {
        workspace_id: "ws-1".to_string(),
        participant_id: "visitor-1".to_string(),
        display_name: "Visitor One".to_string(),
        kind: SenderKind::Visitor,
    }
}

fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    // Keep reconnect cycles fast enough for tests.
    config.reconnect.max_attempts = 3;
    config.reconnect.base_delay_ms = 10;
    config.reconnect.max_delay_ms = 40;
    config
}

fn engine(config: &AppConfig) -> (ClientServices, Arc<ChannelTransport>) {
    let transport = Arc::new(ChannelTransport::new());
    let services = ClientServices::initialise_with(
        config,
        identity(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::new(StubFileApi),
    );
    (services, transport)
}

async fn connected_peer(
    services: &ClientServices,
    transport: &ChannelTransport,
) -> TransportPeer {
    assert!(services.connect("token").await, "connect should succeed");
    let mut peer = transport.take_peer().expect("transport peer");
    let _ = peer.sent.recv().await; // drain get-server-time handshake
    peer
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

fn frame(event: &InboundEvent) -> String {
    serde_json::to_string(event).expect("serialize inbound event")
}

fn room_details(rooms: &[&str]) -> InboundEvent {
    InboundEvent::RoomDetails {
        rooms: rooms
            .iter()
            .map(|id| RoomInfo {
                room_id: id.to_string(),
                subject: None,
            })
            .collect(),
    }
}

#[tokio::test]
async fn inbound_message_is_stored_and_acknowledged() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let mut peer = connected_peer(&services, &transport).await;

    peer.inject
        .send(frame(&InboundEvent::NewMessage {
            room_id: "room-1".to_string(),
            message_id: "m1".to_string(),
            message: "hello there".to_string(),
            sender_id: "agent-9".to_string(),
            sender_name: Some("Agent Nine".to_string()),
            sender_type: SenderKind::Agent,
            created_at: None,
        }))
        .await
        .expect("inject");
    settle().await;

    {
        let store = services.store.lock();
        let messages = store.messages("room-1");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hello there");
        assert_eq!(messages[0].status, DeliveryStatus::Delivered);
        assert_eq!(store.unread_count("room-1"), 1);
    }

    // The engine acknowledges receipt with the exact id.
    let receipt = peer.sent.recv().await.expect("delivered receipt");
    let value: serde_json::Value = serde_json::from_str(&receipt).expect("json");
    assert_eq!(value["type"], "message-delivered");
    assert_eq!(value["payload"]["roomId"], "room-1");
    assert_eq!(value["payload"]["messages"][0]["messageId"], "m1");
    assert_eq!(value["payload"]["messages"][0]["senderId"], "agent-9");
}

#[tokio::test]
async fn offline_send_completes_its_lifecycle_after_reconnect() {
    let config = test_config();
    let (services, transport) = engine(&config);

    // Send while the transport is down: optimistic append only.
    let outcome = services.send_message("room-1", "Hi");
    assert!(!outcome.emitted);
    let m1 = outcome.message_id;
    assert_eq!(
        services.store.lock().messages("room-1")[0].status,
        DeliveryStatus::Sent
    );

    let peer = connected_peer(&services, &transport).await;

    let sent_at = chrono::Utc::now();
    peer.inject
        .send(frame(&InboundEvent::MessageAck {
            room_id: "room-1".to_string(),
            message_id: m1.clone(),
            sent_at,
        }))
        .await
        .expect("inject ack");
    settle().await;
    {
        let store = services.store.lock();
        let message = &store.messages("room-1")[0];
        assert_eq!(message.status, DeliveryStatus::Sent);
        assert_eq!(message.sent_at, Some(sent_at));
    }

    let delivered_at = sent_at + chrono::Duration::seconds(1);
    peer.inject
        .send(frame(&InboundEvent::DeliveredTo {
            room_id: "room-1".to_string(),
            message_id: m1.clone(),
            delivered_at,
        }))
        .await
        .expect("inject delivered");
    settle().await;
    assert_eq!(
        services.store.lock().messages("room-1")[0].status,
        DeliveryStatus::Delivered
    );

    let read_at = sent_at + chrono::Duration::seconds(2);
    peer.inject
        .send(frame(&InboundEvent::MessagesRead {
            room_id: "room-1".to_string(),
            message_ids: vec![m1.clone()],
            read_at,
        }))
        .await
        .expect("inject read");
    settle().await;
    assert_eq!(
        services.store.lock().messages("room-1")[0].status,
        DeliveryStatus::Read
    );

    // A second delivered event after read must be a no-op.
    peer.inject
        .send(frame(&InboundEvent::DeliveredTo {
            room_id: "room-1".to_string(),
            message_id: m1.clone(),
            delivered_at: read_at + chrono::Duration::seconds(5),
        }))
        .await
        .expect("inject duplicate delivered");
    settle().await;
    {
        let store = services.store.lock();
        let message = &store.messages("room-1")[0];
        assert_eq!(message.status, DeliveryStatus::Read);
        assert_eq!(message.delivered_at, Some(delivered_at));
    }
}

#[tokio::test]
async fn reconnect_replaces_rooms_with_the_server_answer() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let peer = connected_peer(&services, &transport).await;

    let (mut states, _task) = ReconnectionCoordinator::new(
        Arc::clone(&services.manager),
        Arc::clone(&services.store),
        config.reconnect.clone(),
    )
    .spawn();

    peer.inject
        .send(frame(&room_details(&["room-1", "room-2"])))
        .await
        .expect("inject rooms");
    settle().await;
    assert_eq!(services.manager.joined_rooms(), vec!["room-1", "room-2"]);

    // Transport drops.
    drop(peer.inject);
    settle().await;
    assert_eq!(services.manager.status(), TransportStatus::Disconnected);

    // The coordinator replays the handshake; the server answers with a
    // different room set than the one held before the drop.
    let mut new_peer = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(peer) = transport.take_peer() {
                break peer;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reconnect within budget");
    let _ = new_peer.sent.recv().await; // handshake

    new_peer
        .inject
        .send(frame(&room_details(&["room-2", "room-3"])))
        .await
        .expect("inject new rooms");

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *states.borrow() == ReconnectState::Connected
                && services.manager.status() == TransportStatus::Connected
            {
                break;
            }
            states.changed().await.expect("state watch");
        }
    })
    .await
    .expect("coordinator reports connected");
    settle().await;

    assert_eq!(
        services.manager.joined_rooms(),
        vec!["room-2", "room-3"],
        "local room state must be replaced by the server's answer"
    );
}

#[tokio::test]
async fn reconnect_prunes_transitional_notices() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let peer = connected_peer(&services, &transport).await;

    services.send_message("room-1", "before the drop");

    let (_states, _task) = ReconnectionCoordinator::new(
        Arc::clone(&services.manager),
        Arc::clone(&services.store),
        config.reconnect.clone(),
    )
    .spawn();

    drop(peer.inject);

    // While reconnecting, the transcript shows a transitional notice.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if services
                .store
                .lock()
                .messages("room-1")
                .iter()
                .any(|m| m.transient)
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("notice inserted during outage");

    // Let the reconnect complete.
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if services.manager.status() == TransportStatus::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("reconnected");
    settle().await;

    let store = services.store.lock();
    assert!(
        store.messages("room-1").iter().all(|m| !m.transient),
        "stale transitional chatter must be pruned after resync"
    );
    assert_eq!(store.messages("room-1").len(), 1);
}

#[tokio::test]
async fn exhausted_retry_budget_is_caller_visible() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let peer = connected_peer(&services, &transport).await;

    let (mut states, _task) = ReconnectionCoordinator::new(
        Arc::clone(&services.manager),
        Arc::clone(&services.store),
        config.reconnect.clone(),
    )
    .spawn();

    // Every reconnect attempt will fail.
    transport.fail_next_opens(usize::MAX);
    drop(peer.inject);

    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if *states.borrow() == ReconnectState::Failed {
                break;
            }
            states.changed().await.expect("state watch");
        }
    })
    .await
    .expect("budget exhaustion surfaces as Failed");

    assert_eq!(services.manager.status(), TransportStatus::Disconnected);
}

#[tokio::test]
async fn typing_flows_both_ways() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let mut peer = connected_peer(&services, &transport).await;

    // Outbound: a local keystroke becomes a typing frame via the pump.
    services.set_typing("room-1", true);
    let frame_text = tokio::time::timeout(Duration::from_secs(2), peer.sent.recv())
        .await
        .expect("typing frame in time")
        .expect("typing frame");
    let value: serde_json::Value = serde_json::from_str(&frame_text).expect("json");
    assert_eq!(value["type"], "typing");
    assert_eq!(value["payload"]["roomId"], "room-1");
    assert_eq!(value["payload"]["isTyping"], true);

    // Inbound: agent typing is observable, own echoes are ignored.
    peer.inject
        .send(frame(&InboundEvent::AgentTyping {
            room_id: "room-1".to_string(),
            participant_id: "agent-9".to_string(),
            is_typing: true,
        }))
        .await
        .expect("inject agent typing");
    peer.inject
        .send(frame(&InboundEvent::ClientTyping {
            room_id: "room-1".to_string(),
            participant_id: "visitor-1".to_string(),
            is_typing: true,
        }))
        .await
        .expect("inject own echo");
    settle().await;

    assert!(services.typing.is_typing("room-1", "agent-9"));
    assert!(!services.typing.is_typing("room-1", "visitor-1"));
}

#[tokio::test]
async fn mark_room_read_acknowledges_the_exact_id_list() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let mut peer = connected_peer(&services, &transport).await;

    for (id, text) in [("m1", "first"), ("m2", "second")] {
        peer.inject
            .send(frame(&InboundEvent::NewMessage {
                room_id: "room-1".to_string(),
                message_id: id.to_string(),
                message: text.to_string(),
                sender_id: "agent-9".to_string(),
                sender_name: None,
                sender_type: SenderKind::Agent,
                created_at: None,
            }))
            .await
            .expect("inject");
    }
    settle().await;

    // Drain the two delivered receipts.
    let _ = peer.sent.recv().await;
    let _ = peer.sent.recv().await;

    let marked = services.mark_room_read("room-1");
    assert_eq!(marked, vec!["m1".to_string(), "m2".to_string()]);
    assert_eq!(services.store.lock().unread_count("room-1"), 0);

    let ack = peer.sent.recv().await.expect("read acknowledgement");
    let value: serde_json::Value = serde_json::from_str(&ack).expect("json");
    assert_eq!(value["type"], "message-delivered");
    let ids: Vec<&str> = value["payload"]["messages"]
        .as_array()
        .expect("messages array")
        .iter()
        .map(|entry| entry["messageId"].as_str().expect("id"))
        .collect();
    assert_eq!(ids, vec!["m1", "m2"]);
}

#[tokio::test]
async fn encrypted_messages_roundtrip_through_the_glue() {
    let mut config = test_config();
    config.encryption.enabled = true;
    let (services, transport) = engine(&config);
    let mut peer = connected_peer(&services, &transport).await;

    // Outbound content is wrapped in an AES envelope.
    services.send_message("room-1", "secret greeting");
    let sent = peer.sent.recv().await.expect("message frame");
    let value: serde_json::Value = serde_json::from_str(&sent).expect("json");
    assert_eq!(value["type"], "message");
    let wire_content = value["payload"]["message"].as_str().expect("content");
    let envelope: frontdesk_crypto::Envelope =
        serde_json::from_str(wire_content).expect("envelope json");
    assert_eq!(envelope.algorithm, "aes-256-gcm");

    // Inbound envelopes from the remote side decrypt transparently: the
    // agent's codec derives the same session key.
    let agent_codec = EncryptionCodec::for_messages(false);
    let agent_envelope = agent_codec
        .encrypt(b"encrypted reply", "room-1")
        .expect("encrypt");
    peer.inject
        .send(frame(&InboundEvent::NewMessage {
            room_id: "room-1".to_string(),
            message_id: "m9".to_string(),
            message: serde_json::to_string(&agent_envelope).expect("serialize"),
            sender_id: "agent-9".to_string(),
            sender_name: None,
            sender_type: SenderKind::Agent,
            created_at: None,
        }))
        .await
        .expect("inject");
    settle().await;

    let store = services.store.lock();
    let messages = store.messages("room-1");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "encrypted reply");
}

#[tokio::test]
async fn send_file_populates_the_attachment_asynchronously() {
    let config = test_config();
    let (services, transport) = engine(&config);
    let mut peer = connected_peer(&services, &transport).await;

    let content = Bytes::from(vec![3u8; 4096]);
    let metadata = FileMetadata {
        file_name: "screenshot.png".to_string(),
        mime_type: "image/png".to_string(),
        size: content.len() as u64,
    };

    let message_id = services
        .send_file("room-1", metadata, content)
        .await
        .expect("send file");

    {
        let store = services.store.lock();
        let message = store
            .messages("room-1")
            .iter()
            .find(|m| m.id == message_id)
            .expect("file message")
            .clone();
        let attachment = message.attachment.expect("attachment");
        assert_eq!(attachment.upload_status, UploadStatus::Completed);
        assert_eq!(attachment.url.as_deref(), Some("https://cdn.test/stub"));
        assert_eq!(attachment.checksum.len(), 64);
    }

    // The file notification rides the same channel as text messages.
    let notification = peer.sent.recv().await.expect("file-message frame");
    let value: serde_json::Value = serde_json::from_str(&notification).expect("json");
    assert_eq!(value["type"], "file-message");
    assert_eq!(value["payload"]["messageId"], message_id);
}
