//! Conversation state for the realtime engine: the ordered message log
//! with its monotonic delivery lifecycle, and ephemeral typing presence.

pub mod store;
pub mod typing;
pub mod types;

pub use store::MessageLifecycleStore;
pub use typing::{TypingPresenceTracker, TypingSignal};
pub use types::{
    DeliveryStatus, FileAttachment, Message, Sender, SenderKind, UploadStatus,
};
