//! Session-keyed encrypt/decrypt with caching.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;

use crate::envelope::{Envelope, ALGORITHM_AES_256_GCM, ALGORITHM_NONE, ENVELOPE_VERSION};
use crate::error::{CryptoError, CryptoResult};

const KEY_LEN: usize = 32;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Which payload domain a codec instance serves.
///
/// Message and file envelopes use the same wire shape but must never share
/// key material, so each purpose derives from its own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecPurpose {
    Message,
    File,
}

impl CodecPurpose {
    fn key_prefix(self) -> &'static str {
        match self {
            CodecPurpose::Message => "msg",
            CodecPurpose::File => "file",
        }
    }
}

/// Symmetric envelope codec keyed per session.
///
/// Key material is derived deterministically from the session id, so both
/// ends of the channel arrive at the same key without a separate exchange
/// and repeated `generate_session_key` calls can never rotate it.
pub struct EncryptionCodec {
    purpose: CodecPurpose,
    passthrough: bool,
    keys: Mutex<HashMap<String, [u8; KEY_LEN]>>,
    decrypted: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl EncryptionCodec {
    pub fn new(purpose: CodecPurpose, passthrough: bool) -> Self {
        Self {
            purpose,
            passthrough,
            keys: Mutex::new(HashMap::new()),
            decrypted: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_messages(passthrough: bool) -> Self {
        Self::new(CodecPurpose::Message, passthrough)
    }

    pub fn for_files(passthrough: bool) -> Self {
        Self::new(CodecPurpose::File, passthrough)
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// Ensure key material exists for the session and return its key id.
    ///
    /// Idempotent: the key is a pure function of (purpose, session id),
    /// cached after the first derivation.
    pub fn generate_session_key(&self, session_id: &str) -> String {
        let mut keys = self.keys.lock();
        if !keys.contains_key(session_id) {
            keys.insert(session_id.to_string(), self.derive_key(session_id));
            debug!(session_id, purpose = ?self.purpose, "derived session key");
        }
        self.key_id(session_id)
    }

    fn derive_key(&self, session_id: &str) -> [u8; KEY_LEN] {
        let mut hasher = Sha256::new();
        hasher.update(b"frontdesk/");
        hasher.update(self.purpose.key_prefix().as_bytes());
        hasher.update(b"/session-key/v1:");
        hasher.update(session_id.as_bytes());
        hasher.finalize().into()
    }

    fn key_id(&self, session_id: &str) -> String {
        format!("{}-{}", self.purpose.key_prefix(), session_id)
    }

    fn session_key(&self, session_id: &str) -> [u8; KEY_LEN] {
        let mut keys = self.keys.lock();
        *keys
            .entry(session_id.to_string())
            .or_insert_with(|| self.derive_key(session_id))
    }

    /// Build an envelope with a fresh IV but no content yet.
    ///
    /// Used during upload-session negotiation, where the server records the
    /// key id and IV before any ciphertext exists. The auth tag stays empty
    /// until content is actually sealed.
    pub fn prepare_envelope(&self, session_id: &str) -> Envelope {
        let key_id = self.generate_session_key(session_id);
        let algorithm = if self.passthrough {
            ALGORITHM_NONE
        } else {
            ALGORITHM_AES_256_GCM
        };

        let iv = if self.passthrough {
            String::new()
        } else {
            let mut iv = [0u8; IV_LEN];
            rand::rngs::OsRng.fill_bytes(&mut iv);
            BASE64.encode(iv)
        };

        Envelope {
            algorithm: algorithm.to_string(),
            iv,
            auth_tag: String::new(),
            key_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            version: ENVELOPE_VERSION,
            encrypted_content: String::new(),
        }
    }

    /// Seal content under the session key.
    pub fn encrypt(&self, content: &[u8], session_id: &str) -> CryptoResult<Envelope> {
        let key_id = self.generate_session_key(session_id);

        if self.passthrough {
            return Ok(Envelope {
                algorithm: ALGORITHM_NONE.to_string(),
                iv: String::new(),
                auth_tag: String::new(),
                key_id,
                timestamp: chrono::Utc::now().timestamp_millis(),
                version: ENVELOPE_VERSION,
                encrypted_content: BASE64.encode(content),
            });
        }

        let key = self.session_key(session_id);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

        let mut iv = [0u8; IV_LEN];
        rand::rngs::OsRng.fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), Payload::from(content))
            .map_err(|error| CryptoError::encrypt(error.to_string()))?;

        // aes-gcm appends the tag to the ciphertext; the envelope carries
        // them as separate fields.
        let split = sealed.len() - TAG_LEN;
        let (ciphertext, tag) = sealed.split_at(split);

        Ok(Envelope {
            algorithm: ALGORITHM_AES_256_GCM.to_string(),
            iv: BASE64.encode(iv),
            auth_tag: BASE64.encode(tag),
            key_id,
            timestamp: chrono::Utc::now().timestamp_millis(),
            version: ENVELOPE_VERSION,
            encrypted_content: BASE64.encode(ciphertext),
        })
    }

    /// Open an envelope back into the original content.
    ///
    /// Results are cached per (session, ciphertext), so re-rendering the
    /// same message never re-runs the cipher.
    pub fn decrypt(&self, envelope: &Envelope, session_id: &str) -> CryptoResult<Vec<u8>> {
        let cache_key = (session_id.to_string(), envelope.encrypted_content.clone());
        if let Some(content) = self.decrypted.lock().get(&cache_key) {
            return Ok(content.clone());
        }

        let content = match envelope.algorithm.as_str() {
            ALGORITHM_NONE => BASE64
                .decode(&envelope.encrypted_content)
                .map_err(|_| CryptoError::malformed("encryptedContent"))?,
            ALGORITHM_AES_256_GCM => {
                let expected_key_id = self.key_id(session_id);
                if envelope.key_id != expected_key_id {
                    return Err(CryptoError::key_mismatch(
                        expected_key_id,
                        envelope.key_id.clone(),
                    ));
                }

                let key = self.session_key(session_id);
                let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

                let iv = BASE64
                    .decode(&envelope.iv)
                    .map_err(|_| CryptoError::malformed("iv"))?;
                if iv.len() != IV_LEN {
                    return Err(CryptoError::malformed("iv"));
                }
                let mut sealed = BASE64
                    .decode(&envelope.encrypted_content)
                    .map_err(|_| CryptoError::malformed("encryptedContent"))?;
                let tag = BASE64
                    .decode(&envelope.auth_tag)
                    .map_err(|_| CryptoError::malformed("authTag"))?;
                if tag.len() != TAG_LEN {
                    return Err(CryptoError::malformed("authTag"));
                }
                sealed.extend_from_slice(&tag);

                cipher
                    .decrypt(Nonce::from_slice(&iv), sealed.as_slice())
                    .map_err(|_| CryptoError::AuthenticationFailed)?
            }
            other => return Err(CryptoError::unsupported_algorithm(other)),
        };

        self.decrypted.lock().insert(cache_key, content.clone());
        Ok(content)
    }

    #[cfg(test)]
    fn cached_decrypts(&self) -> usize {
        self.decrypted.lock().len()
    }
}
