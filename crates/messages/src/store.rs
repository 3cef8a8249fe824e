//! In-memory ordered message log with monotonic lifecycle transitions.
//!
//! This is a pure state machine: no async, no transport, no framework.
//! All mutation goes through the transition methods below; unknown ids and
//! replayed events are recoverable no-ops, never errors.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

use crate::types::{DeliveryStatus, Message, Sender};

/// Single source of truth for message ordering and status per conversation.
#[derive(Debug)]
pub struct MessageLifecycleStore {
    local_participant_id: String,
    rooms: HashMap<String, Vec<Message>>,
}

impl MessageLifecycleStore {
    pub fn new(local_participant_id: impl Into<String>) -> Self {
        Self {
            local_participant_id: local_participant_id.into(),
            rooms: HashMap::new(),
        }
    }

    pub fn local_participant_id(&self) -> &str {
        &self.local_participant_id
    }

    /// Append an optimistic local message at the tail, status `sent`.
    ///
    /// Conversation ordering is insertion order; a later server ack stamps
    /// the confirmed time but never reorders. A reused id is dropped.
    pub fn append_local(&mut self, mut message: Message) {
        let room = message.room_id.clone();
        if self.find(&room, &message.id).is_some() {
            debug!(room_id = %room, message_id = %message.id, "duplicate local append ignored");
            return;
        }
        message.status = DeliveryStatus::Sent;
        self.rooms.entry(room).or_default().push(message);
    }

    /// Append a message received from the remote side.
    ///
    /// Recorded as `delivered` locally; redelivered duplicates are no-ops.
    pub fn append_remote(&mut self, mut message: Message) {
        let room = message.room_id.clone();
        if self.find(&room, &message.id).is_some() {
            debug!(room_id = %room, message_id = %message.id, "duplicate remote message ignored");
            return;
        }
        if message.status < DeliveryStatus::Delivered {
            message.status = DeliveryStatus::Delivered;
        }
        if message.delivered_at.is_none() {
            message.delivered_at = Some(Utc::now());
        }
        self.rooms.entry(room).or_default().push(message);
    }

    /// Stamp the server-confirmed send time on an acknowledged message.
    ///
    /// No-op if the message is unknown or already past `sent`; replays of
    /// the same ack therefore cannot double count.
    pub fn apply_ack(&mut self, room_id: &str, message_id: &str, sent_at: DateTime<Utc>) {
        let Some(message) = self.find_mut(room_id, message_id) else {
            debug!(room_id, message_id, "ack for unknown message ignored");
            return;
        };
        if message.status > DeliveryStatus::Sent || message.sent_at.is_some() {
            return;
        }
        message.sent_at = Some(sent_at);
    }

    /// Transition `sent` → `delivered`. Ignored at `delivered` or `read`.
    pub fn apply_delivered(
        &mut self,
        room_id: &str,
        message_id: &str,
        delivered_at: DateTime<Utc>,
    ) {
        let Some(message) = self.find_mut(room_id, message_id) else {
            debug!(room_id, message_id, "delivered event for unknown message ignored");
            return;
        };
        if message.status >= DeliveryStatus::Delivered {
            return;
        }
        message.status = DeliveryStatus::Delivered;
        message.delivered_at = Some(delivered_at);
    }

    /// Batch transition to `read`.
    ///
    /// The server is authoritative: a message that never saw its delivered
    /// event is promoted implicitly before being marked read.
    pub fn apply_read(&mut self, room_id: &str, message_ids: &[String], read_at: DateTime<Utc>) {
        for message_id in message_ids {
            let Some(message) = self.find_mut(room_id, message_id) else {
                debug!(room_id, message_id, "read event for unknown message ignored");
                continue;
            };
            if message.status >= DeliveryStatus::Read {
                continue;
            }
            if message.status < DeliveryStatus::Delivered {
                debug!(
                    room_id,
                    message_id, "read event promoting undelivered message; delivered event may have been lost"
                );
                message.delivered_at = Some(read_at);
            }
            message.status = DeliveryStatus::Read;
            message.read_at = Some(read_at);
        }
    }

    /// Local-only optimistic read transition for when the local participant
    /// views a conversation.
    ///
    /// Returns the ids that changed so the caller can emit the explicit
    /// acknowledgement with an exact id list; this method itself never
    /// notifies the remote side.
    pub fn mark_all_read(&mut self, room_id: &str) -> Vec<String> {
        let local = self.local_participant_id.clone();
        let now = Utc::now();
        let Some(messages) = self.rooms.get_mut(room_id) else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for message in messages.iter_mut() {
            if message.sender.id == local || message.status >= DeliveryStatus::Read {
                continue;
            }
            message.status = DeliveryStatus::Read;
            message.read_at = Some(now);
            changed.push(message.id.clone());
        }
        changed
    }

    /// Update the attachment riding a message as its transfer progresses.
    ///
    /// A `completed` attachment is immutable; later updates are ignored.
    pub fn set_attachment(
        &mut self,
        room_id: &str,
        message_id: &str,
        attachment: crate::types::FileAttachment,
    ) {
        let Some(message) = self.find_mut(room_id, message_id) else {
            debug!(room_id, message_id, "attachment update for unknown message ignored");
            return;
        };
        if let Some(existing) = &message.attachment {
            if existing.upload_status == crate::types::UploadStatus::Completed {
                debug!(room_id, message_id, "completed attachment is immutable");
                return;
            }
        }
        message.attachment = Some(attachment);
    }

    /// Insert a locally generated transcript notice (e.g. "reconnecting").
    pub fn insert_system_notice(&mut self, room_id: &str, text: impl Into<String>) -> String {
        let mut notice = Message::outgoing(room_id, text, Sender::system());
        notice.transient = true;
        let id = notice.id.clone();
        self.rooms.entry(room_id.to_string()).or_default().push(notice);
        id
    }

    /// Drop transient notices so resynchronization does not leave stale
    /// transitional chatter in the transcript.
    pub fn prune_system_notices(&mut self, room_id: &str) {
        if let Some(messages) = self.rooms.get_mut(room_id) {
            messages.retain(|message| !message.transient);
        }
    }

    /// Remove a conversation wholesale. The only removal path for messages.
    pub fn clear_room(&mut self, room_id: &str) {
        self.rooms.remove(room_id);
    }

    pub fn messages(&self, room_id: &str) -> &[Message] {
        self.rooms.get(room_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn room_ids(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Derived unread count: remote messages not yet read locally.
    ///
    /// Recomputed from the log on every call rather than cached, so it can
    /// never drift from the transcript.
    pub fn unread_count(&self, room_id: &str) -> usize {
        self.messages(room_id)
            .iter()
            .filter(|message| {
                message.sender.id != self.local_participant_id
                    && !message.transient
                    && message.status < DeliveryStatus::Read
            })
            .count()
    }

    fn find(&self, room_id: &str, message_id: &str) -> Option<&Message> {
        self.rooms
            .get(room_id)?
            .iter()
            .find(|message| message.id == message_id)
    }

    fn find_mut(&mut self, room_id: &str, message_id: &str) -> Option<&mut Message> {
        self.rooms
            .get_mut(room_id)?
            .iter_mut()
            .find(|message| message.id == message_id)
    }
}
