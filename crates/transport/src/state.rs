//! Connection-level state owned by the manager.

use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Connected,
    Connecting,
    Disconnected,
}

/// Mutable state of the single physical connection.
///
/// `joined_rooms` is server-authoritative: it is populated from
/// `room-details` snapshots and replaced wholesale on resynchronization.
#[derive(Debug, Clone)]
pub struct ConnectionState {
    pub transport_status: TransportStatus,
    pub workspace_id: Option<String>,
    pub participant_id: Option<String>,
    pub joined_rooms: BTreeSet<String>,
    /// Server clock minus local clock, in milliseconds.
    pub server_time_offset_ms: i64,
}

impl ConnectionState {
    pub fn new() -> Self {
        Self {
            transport_status: TransportStatus::Disconnected,
            workspace_id: None,
            participant_id: None,
            joined_rooms: BTreeSet::new(),
            server_time_offset_ms: 0,
        }
    }

    pub fn set_identity(&mut self, workspace_id: &str, participant_id: &str) {
        self.workspace_id = Some(workspace_id.to_string());
        self.participant_id = Some(participant_id.to_string());
    }

    pub fn replace_rooms<I>(&mut self, rooms: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.joined_rooms = rooms.into_iter().collect();
    }

    /// Full reset back to the logged-out state.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}
