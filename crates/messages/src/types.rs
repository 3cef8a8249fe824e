//! Core data model for conversations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    Visitor,
    Agent,
    System,
}

impl SenderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderKind::Visitor => "visitor",
            SenderKind::Agent => "agent",
            SenderKind::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub kind: SenderKind,
    pub id: String,
}

impl Sender {
    pub fn visitor(id: impl Into<String>) -> Self {
        Self {
            kind: SenderKind::Visitor,
            id: id.into(),
        }
    }

    pub fn agent(id: impl Into<String>) -> Self {
        Self {
            kind: SenderKind::Agent,
            id: id.into(),
        }
    }

    pub fn system() -> Self {
        Self {
            kind: SenderKind::System,
            id: "system".to_string(),
        }
    }
}

/// Delivery lifecycle of a message.
///
/// The ordering derive is load-bearing: transitions are accepted only when
/// they move strictly forward, which is what makes duplicate and
/// out-of-order acknowledgement events harmless.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Upload progress of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Initiated,
    Uploading,
    Completed,
    Failed,
}

/// File metadata riding on a message.
///
/// Created when the upload session opens and mutated by transfer progress;
/// once `Completed` the pipeline never touches it again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    pub file_name: String,
    pub mime_type: String,
    pub size: u64,
    /// Hex-encoded SHA-256 of the file content.
    pub checksum: String,
    pub url: Option<String>,
    pub preview_url: Option<String>,
    pub upload_status: UploadStatus,
}

impl FileAttachment {
    pub fn initiated(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        size: u64,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            size,
            checksum: checksum.into(),
            url: None,
            preview_url: None,
            upload_status: UploadStatus::Initiated,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.upload_status,
            UploadStatus::Completed | UploadStatus::Failed
        )
    }
}

/// A single conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Client-generated idempotency key; never reused.
    pub id: String,
    pub room_id: String,
    pub content: String,
    pub sender: Sender,
    pub created_at: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// Server-confirmed send time, stamped by the ack.
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub attachment: Option<FileAttachment>,
    /// Locally inserted transcript notice, pruned on resynchronization.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub transient: bool,
}

impl Message {
    /// A freshly composed outbound message, pre-acknowledgement.
    pub fn outgoing(
        room_id: impl Into<String>,
        content: impl Into<String>,
        sender: Sender,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            room_id: room_id.into(),
            content: content.into(),
            sender,
            created_at: Utc::now(),
            status: DeliveryStatus::Sent,
            sent_at: None,
            delivered_at: None,
            read_at: None,
            attachment: None,
            transient: false,
        }
    }

    /// A message received over the channel from the remote side.
    pub fn incoming(
        id: impl Into<String>,
        room_id: impl Into<String>,
        content: impl Into<String>,
        sender: Sender,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            room_id: room_id.into(),
            content: content.into(),
            sender,
            created_at,
            status: DeliveryStatus::Delivered,
            sent_at: None,
            delivered_at: Some(Utc::now()),
            read_at: None,
            attachment: None,
            transient: false,
        }
    }
}
