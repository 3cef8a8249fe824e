//! The connection manager: sole owner of the physical transport.
//!
//! One manager maintains at most one live channel for one
//! (workspace, participant) identity. Inbound frames are parsed and fanned
//! out through the event bus by a single dispatch task, which preserves
//! per-conversation arrival order by construction.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bus::{EventBus, HandlerId};
use crate::protocol::{InboundEvent, InboundEventKind, OutboundEvent};
use crate::state::{ConnectionState, TransportStatus};
use crate::transport::{ConnectRequest, Transport};

/// Identity required to open the channel.
///
/// All three fields are mandatory; `connect` treats a missing one as a
/// configuration error and returns `None` rather than failing hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectConfig {
    pub workspace_id: String,
    pub participant_id: String,
    pub token: String,
}

impl ConnectConfig {
    fn is_complete(&self) -> bool {
        !self.workspace_id.is_empty()
            && !self.participant_id.is_empty()
            && !self.token.is_empty()
    }
}

type OutboundSlot = Arc<RwLock<Option<mpsc::Sender<String>>>>;

/// Cheap cloneable handle for emitting outbound events.
///
/// Handed to components (file pipeline, typing glue) that must emit over
/// the shared channel without owning the manager.
#[derive(Clone)]
pub struct EmitHandle {
    outbound: OutboundSlot,
    status_rx: watch::Receiver<TransportStatus>,
}

impl EmitHandle {
    /// Send an event over the channel. Returns `false` when the transport
    /// is not connected; the payload is dropped and the caller owns any
    /// retry. There is no implicit outbound queue.
    pub fn emit(&self, event: &OutboundEvent) -> bool {
        if *self.status_rx.borrow() != TransportStatus::Connected {
            return false;
        }
        emit_frame(&self.outbound, event)
    }
}

fn emit_frame(outbound: &OutboundSlot, event: &OutboundEvent) -> bool {
    let guard = outbound.read();
    let Some(sender) = guard.as_ref() else {
        return false;
    };
    let frame = match serde_json::to_string(event) {
        Ok(frame) => frame,
        Err(error) => {
            warn!(%error, "failed to serialize outbound event");
            return false;
        }
    };
    if let Err(error) = sender.try_send(frame) {
        warn!(%error, "outbound channel rejected frame");
        return false;
    }
    true
}

pub struct ConnectionManager {
    endpoint: String,
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    state: Arc<RwLock<ConnectionState>>,
    outbound: OutboundSlot,
    identity: RwLock<Option<ConnectConfig>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
    status_tx: Arc<watch::Sender<TransportStatus>>,
    status_rx: watch::Receiver<TransportStatus>,
}

impl ConnectionManager {
    pub fn new(endpoint: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        let (status_tx, status_rx) = watch::channel(TransportStatus::Disconnected);
        Self {
            endpoint: endpoint.into(),
            transport,
            bus: Arc::new(EventBus::new()),
            state: Arc::new(RwLock::new(ConnectionState::new())),
            outbound: Arc::new(RwLock::new(None)),
            identity: RwLock::new(None),
            dispatch: Mutex::new(None),
            status_tx: Arc::new(status_tx),
            status_rx,
        }
    }

    /// Open the channel for the given identity.
    ///
    /// Idempotent: connecting again with the identical identity while
    /// connected returns the existing connection. A differing identity
    /// tears the old connection down gracefully first. Missing config is a
    /// configuration error: logged, and `None` is returned for the caller
    /// to handle.
    pub async fn connect(&self, config: ConnectConfig) -> Option<EmitHandle> {
        if !config.is_complete() {
            warn!(
                workspace_id = %config.workspace_id,
                participant_id = %config.participant_id,
                "connect called with incomplete config"
            );
            return None;
        }

        let mut dispatch_slot = self.dispatch.lock().await;

        if self.status() == TransportStatus::Connected
            && self.identity.read().as_ref() == Some(&config)
        {
            debug!("already connected with identical identity");
            return Some(self.emit_handle());
        }

        if let Some(previous) = dispatch_slot.take() {
            info!("tearing down previous connection before identity change");
            self.close_channel(previous);
        }

        self.set_status(TransportStatus::Connecting);
        {
            let mut state = self.state.write();
            state.transport_status = TransportStatus::Connecting;
            state.set_identity(&config.workspace_id, &config.participant_id);
            state.joined_rooms.clear();
        }

        let request = ConnectRequest {
            url: self.endpoint.clone(),
            workspace_id: config.workspace_id.clone(),
            participant_id: config.participant_id.clone(),
            token: config.token.clone(),
        };

        let channel = match self.transport.open(&request).await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(%error, "transport open failed");
                self.set_status(TransportStatus::Disconnected);
                self.state.write().transport_status = TransportStatus::Disconnected;
                return None;
            }
        };

        *self.outbound.write() = Some(channel.outbound);
        *self.identity.write() = Some(config);
        self.set_status(TransportStatus::Connected);
        self.state.write().transport_status = TransportStatus::Connected;

        *dispatch_slot = Some(self.spawn_dispatch(channel.inbound));
        drop(dispatch_slot);

        // Handshake: ask for the authoritative clock. Room membership is
        // pushed by the server as a room-details snapshot for this
        // identity, so there is nothing further to request.
        if !self.emit(&OutboundEvent::GetServerTime {}) {
            warn!("handshake emit failed immediately after connect");
        }

        info!("realtime channel connected");
        Some(self.emit_handle())
    }

    /// Send an event over the channel; `false` when not connected.
    pub fn emit(&self, event: &OutboundEvent) -> bool {
        if self.status() != TransportStatus::Connected {
            return false;
        }
        emit_frame(&self.outbound, event)
    }

    pub fn add_event_listener<F>(&self, kind: InboundEventKind, handler: F) -> HandlerId
    where
        F: Fn(&InboundEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn remove_event_listener(&self, handler_id: HandlerId) -> bool {
        self.bus.unsubscribe(handler_id)
    }

    /// Close the transport and clear all registered handlers and identity
    /// state.
    pub async fn disconnect(&self) {
        let mut dispatch_slot = self.dispatch.lock().await;
        if let Some(task) = dispatch_slot.take() {
            self.close_channel(task);
        }
        *self.identity.write() = None;
        self.bus.clear();
        self.state.write().reset();
        self.set_status(TransportStatus::Disconnected);
        info!("realtime channel disconnected");
    }

    pub fn status(&self) -> TransportStatus {
        *self.status_rx.borrow()
    }

    /// Watch channel for the reconnection coordinator.
    pub fn status_watch(&self) -> watch::Receiver<TransportStatus> {
        self.status_rx.clone()
    }

    pub fn snapshot(&self) -> ConnectionState {
        self.state.read().clone()
    }

    /// Identity of the current (or last) session; survives transport loss
    /// so a coordinator can replay the handshake.
    pub fn identity(&self) -> Option<ConnectConfig> {
        self.identity.read().clone()
    }

    pub fn joined_rooms(&self) -> Vec<String> {
        self.state.read().joined_rooms.iter().cloned().collect()
    }

    pub fn server_time_offset_ms(&self) -> i64 {
        self.state.read().server_time_offset_ms
    }

    /// Handle for components that emit without owning the manager. Valid
    /// across reconnects; emits fail with `false` while disconnected.
    pub fn emit_handle(&self) -> EmitHandle {
        EmitHandle {
            outbound: Arc::clone(&self.outbound),
            status_rx: self.status_rx.clone(),
        }
    }

    fn set_status(&self, status: TransportStatus) {
        let _ = self.status_tx.send(status);
    }

    /// Drop the outbound side (the transport closes gracefully behind it)
    /// and stop the dispatch task.
    fn close_channel(&self, dispatch: JoinHandle<()>) {
        *self.outbound.write() = None;
        dispatch.abort();
    }

    fn spawn_dispatch(&self, mut inbound: mpsc::Receiver<String>) -> JoinHandle<()> {
        let bus = Arc::clone(&self.bus);
        let state = Arc::clone(&self.state);
        let outbound = Arc::clone(&self.outbound);
        let status_tx = Arc::clone(&self.status_tx);

        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                let event = match serde_json::from_str::<InboundEvent>(&frame) {
                    Ok(event) => event,
                    Err(error) => {
                        // One bad frame must not take down delivery of the
                        // rest.
                        warn!(%error, "dropping unparseable inbound frame");
                        continue;
                    }
                };
                debug!(event = event.event_type_name(), "inbound event");
                apply_to_state(&state, &event);
                bus.dispatch(&event);
            }

            // The channel closing underneath us is transport loss, not a
            // user-initiated disconnect: identity and handlers stay for the
            // reconnection coordinator.
            *outbound.write() = None;
            state.write().transport_status = TransportStatus::Disconnected;
            let _ = status_tx.send(TransportStatus::Disconnected);
            info!("transport lost");
        })
    }
}

fn apply_to_state(state: &RwLock<ConnectionState>, event: &InboundEvent) {
    match event {
        InboundEvent::ServerTime { timestamp } => {
            let offset = timestamp - chrono::Utc::now().timestamp_millis();
            state.write().server_time_offset_ms = offset;
        }
        InboundEvent::RoomDetails { rooms } => {
            state
                .write()
                .replace_rooms(rooms.iter().map(|room| room.room_id.clone()));
        }
        _ => {}
    }
}
