//! Symmetric envelope encryption for the realtime engine.
//!
//! One codec instance serves one payload domain (chat messages or file
//! transfers); the two domains never share key material.

mod codec;
mod envelope;
mod error;

pub use codec::{CodecPurpose, EncryptionCodec};
pub use envelope::{Envelope, ALGORITHM_AES_256_GCM, ALGORITHM_NONE, ENVELOPE_VERSION};
pub use error::{CryptoError, CryptoResult};
