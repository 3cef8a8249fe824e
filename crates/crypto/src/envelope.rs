//! Wire shape of the encryption envelope.

use serde::{Deserialize, Serialize};

pub const ALGORITHM_AES_256_GCM: &str = "aes-256-gcm";

/// Sentinel algorithm for the feature-flagged plaintext passthrough mode.
pub const ALGORITHM_NONE: &str = "none";

pub const ENVELOPE_VERSION: u8 = 1;

/// Encryption envelope carried alongside a message or upload session.
///
/// All binary fields are base64-encoded. In passthrough mode (`algorithm:
/// "none"`) the iv and auth tag are empty and `encrypted_content` is the
/// base64 of the plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub algorithm: String,
    pub iv: String,
    pub auth_tag: String,
    pub key_id: String,
    /// Milliseconds since the Unix epoch at encryption time.
    pub timestamp: i64,
    pub version: u8,
    pub encrypted_content: String,
}

impl Envelope {
    pub fn is_passthrough(&self) -> bool {
        self.algorithm == ALGORITHM_NONE
    }
}
