//! Wire protocol for the realtime channel.
//!
//! Every frame is a uniform `{type, payload}` envelope with a kebab-case
//! type tag and camelCase payload fields. File notifications ride the same
//! envelope as text messages; only the payload shape differs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use frontdesk_messages::{FileAttachment, SenderKind};

/// Events emitted by this client over the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum OutboundEvent {
    GetServerTime {},
    Message {
        room_id: String,
        message_id: String,
        message: String,
        sender_id: String,
        sender_name: String,
        sender_type: SenderKind,
    },
    MessageDelivered {
        messages: Vec<DeliveredReceipt>,
        room_id: String,
    },
    Typing {
        room_id: String,
        is_typing: bool,
    },
    FileMessage {
        message_id: String,
        attachment: FileAttachment,
        upload_id: String,
    },
}

/// One acknowledged message inside a `message-delivered` receipt batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveredReceipt {
    pub message_id: String,
    pub sender_id: String,
}

/// Events pushed by the server and fanned out by the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum InboundEvent {
    AgentConnected {
        room_id: String,
        agent_id: String,
        agent_name: Option<String>,
    },
    NewMessage {
        room_id: String,
        message_id: String,
        message: String,
        sender_id: String,
        sender_name: Option<String>,
        sender_type: SenderKind,
        created_at: Option<DateTime<Utc>>,
    },
    MessageAck {
        room_id: String,
        message_id: String,
        sent_at: DateTime<Utc>,
    },
    DeliveredTo {
        room_id: String,
        message_id: String,
        delivered_at: DateTime<Utc>,
    },
    MessagesRead {
        room_id: String,
        message_ids: Vec<String>,
        read_at: DateTime<Utc>,
    },
    ClientTyping {
        room_id: String,
        participant_id: String,
        is_typing: bool,
    },
    AgentTyping {
        room_id: String,
        participant_id: String,
        is_typing: bool,
    },
    /// Authoritative snapshot of the rooms this participant belongs to.
    RoomDetails {
        rooms: Vec<RoomInfo>,
    },
    VisitorQueues {
        queues: Vec<QueueEntry>,
    },
    AgentJoinedRoom {
        room_id: String,
        agent_id: String,
    },
    AgentLeftRoom {
        room_id: String,
        agent_id: String,
    },
    VisitorPageChanged {
        room_id: String,
        url: String,
        title: Option<String>,
    },
    ParticipantDisconnected {
        room_id: String,
        participant_id: String,
    },
    ServerTime {
        /// Milliseconds since the Unix epoch on the server clock.
        timestamp: i64,
    },
    TagAssignedToChat {
        room_id: String,
        tag: String,
    },
    TagUnassignedFromChat {
        room_id: String,
        tag: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub subject: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    pub room_id: String,
    pub position: u32,
}

/// Discriminant of an inbound event, used to key handler registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundEventKind {
    AgentConnected,
    NewMessage,
    MessageAck,
    DeliveredTo,
    MessagesRead,
    ClientTyping,
    AgentTyping,
    RoomDetails,
    VisitorQueues,
    AgentJoinedRoom,
    AgentLeftRoom,
    VisitorPageChanged,
    ParticipantDisconnected,
    ServerTime,
    TagAssignedToChat,
    TagUnassignedFromChat,
}

impl InboundEvent {
    pub fn kind(&self) -> InboundEventKind {
        match self {
            InboundEvent::AgentConnected { .. } => InboundEventKind::AgentConnected,
            InboundEvent::NewMessage { .. } => InboundEventKind::NewMessage,
            InboundEvent::MessageAck { .. } => InboundEventKind::MessageAck,
            InboundEvent::DeliveredTo { .. } => InboundEventKind::DeliveredTo,
            InboundEvent::MessagesRead { .. } => InboundEventKind::MessagesRead,
            InboundEvent::ClientTyping { .. } => InboundEventKind::ClientTyping,
            InboundEvent::AgentTyping { .. } => InboundEventKind::AgentTyping,
            InboundEvent::RoomDetails { .. } => InboundEventKind::RoomDetails,
            InboundEvent::VisitorQueues { .. } => InboundEventKind::VisitorQueues,
            InboundEvent::AgentJoinedRoom { .. } => InboundEventKind::AgentJoinedRoom,
            InboundEvent::AgentLeftRoom { .. } => InboundEventKind::AgentLeftRoom,
            InboundEvent::VisitorPageChanged { .. } => InboundEventKind::VisitorPageChanged,
            InboundEvent::ParticipantDisconnected { .. } => {
                InboundEventKind::ParticipantDisconnected
            }
            InboundEvent::ServerTime { .. } => InboundEventKind::ServerTime,
            InboundEvent::TagAssignedToChat { .. } => InboundEventKind::TagAssignedToChat,
            InboundEvent::TagUnassignedFromChat { .. } => {
                InboundEventKind::TagUnassignedFromChat
            }
        }
    }

    /// Room this event belongs to, when it targets a single conversation.
    pub fn room_id(&self) -> Option<&str> {
        match self {
            InboundEvent::AgentConnected { room_id, .. }
            | InboundEvent::NewMessage { room_id, .. }
            | InboundEvent::MessageAck { room_id, .. }
            | InboundEvent::DeliveredTo { room_id, .. }
            | InboundEvent::MessagesRead { room_id, .. }
            | InboundEvent::ClientTyping { room_id, .. }
            | InboundEvent::AgentTyping { room_id, .. }
            | InboundEvent::AgentJoinedRoom { room_id, .. }
            | InboundEvent::AgentLeftRoom { room_id, .. }
            | InboundEvent::VisitorPageChanged { room_id, .. }
            | InboundEvent::ParticipantDisconnected { room_id, .. }
            | InboundEvent::TagAssignedToChat { room_id, .. }
            | InboundEvent::TagUnassignedFromChat { room_id, .. } => Some(room_id),
            InboundEvent::RoomDetails { .. }
            | InboundEvent::VisitorQueues { .. }
            | InboundEvent::ServerTime { .. } => None,
        }
    }

    /// Get event type name for logging/metrics
    pub fn event_type_name(&self) -> &'static str {
        match self.kind() {
            InboundEventKind::AgentConnected => "agent-connected",
            InboundEventKind::NewMessage => "new-message",
            InboundEventKind::MessageAck => "message-ack",
            InboundEventKind::DeliveredTo => "delivered-to",
            InboundEventKind::MessagesRead => "messages-read",
            InboundEventKind::ClientTyping => "client-typing",
            InboundEventKind::AgentTyping => "agent-typing",
            InboundEventKind::RoomDetails => "room-details",
            InboundEventKind::VisitorQueues => "visitor-queues",
            InboundEventKind::AgentJoinedRoom => "agent-joined-room",
            InboundEventKind::AgentLeftRoom => "agent-left-room",
            InboundEventKind::VisitorPageChanged => "visitor-page-changed",
            InboundEventKind::ParticipantDisconnected => "participant-disconnected",
            InboundEventKind::ServerTime => "server-time",
            InboundEventKind::TagAssignedToChat => "tag-assigned-to-chat",
            InboundEventKind::TagUnassignedFromChat => "tag-unassigned-from-chat",
        }
    }
}
