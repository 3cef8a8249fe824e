//! The realtime channel: one persistent bidirectional connection per
//! (workspace, participant) identity, a typed event bus fanning inbound
//! events out to subscribers, and the wire protocol shared by every
//! payload kind (text messages, receipts, typing, file notifications).

pub mod bus;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod ws;

pub use bus::{EventBus, HandlerId};
pub use error::{TransportError, TransportResult};
pub use manager::{ConnectConfig, ConnectionManager, EmitHandle};
pub use protocol::{
    DeliveredReceipt, InboundEvent, InboundEventKind, OutboundEvent, QueueEntry, RoomInfo,
};
pub use state::{ConnectionState, TransportStatus};
pub use transport::{ChannelTransport, ConnectRequest, Transport, TransportChannel, TransportPeer};
pub use ws::WsTransport;
