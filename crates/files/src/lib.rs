//! Chunk-free, two-phase file transfer riding the realtime channel:
//! session negotiation against the REST boundary, then content transfer
//! with checksum verification and an optional encryption envelope. The
//! completed attachment is announced over the same channel as text
//! messages.

pub mod api;
pub mod checksum;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod types;

pub use api::{CreateSessionRequest, FileTransferApi, SessionCreated, UploadPayload, UploadResult};
pub use error::{FileError, FileResult};
pub use http::HttpFileTransferApi;
pub use pipeline::FileTransferPipeline;
pub use types::{FileMetadata, SessionStatusResponse, UploadSession};
