// Refresh-token encryption with key rotation
//
// Tokens are stored as base64(nonce || AES-256-GCM ciphertext). Two keys are
// held: `current` seals new values, `previous` still opens values written
// before a rotation. With no key configured the cipher runs in legacy
// plaintext mode and values pass through untouched.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use thiserror::Error;

const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

pub const CURRENT_KEY_ENV: &str = "REFRESH_TOKEN_ENC_KEY_B64";
pub const PREVIOUS_KEY_ENV: &str = "REFRESH_TOKEN_ENC_KEY_B64_OLD";

#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid {name} key: {reason}")]
    InvalidKey { name: &'static str, reason: String },

    #[error("previous key configured without a current key")]
    MissingCurrentKey,

    #[error("ciphertext is not valid base64")]
    Encoding,

    #[error("ciphertext too short")]
    Truncated,

    #[error("decryption failed under every configured key")]
    Decrypt,

    #[error("encryption failed: {0}")]
    Encrypt(String),

    #[error("decrypted token is not valid UTF-8")]
    Utf8,
}

/// Which key opened a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyUsed {
    Current,
    Previous,
    /// Legacy mode, the stored value is the token itself
    Plaintext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decrypted {
    pub plaintext: String,
    pub key: KeyUsed,
}

impl Decrypted {
    /// True when the value should be written back under the current key
    pub fn needs_rewrite(&self) -> bool {
        self.key == KeyUsed::Previous
    }
}

/// Process-wide token cipher; read-only after construction
#[derive(Clone)]
pub struct TokenCipher {
    current: Option<Aes256Gcm>,
    previous: Option<Aes256Gcm>,
}

impl TokenCipher {
    /// Build from base64-encoded 32-byte keys. Any other length fails.
    pub fn new(current_b64: Option<&str>, previous_b64: Option<&str>) -> Result<Self, CipherError> {
        let current = current_b64
            .filter(|k| !k.trim().is_empty())
            .map(|k| parse_key("current", k))
            .transpose()?;
        let previous = previous_b64
            .filter(|k| !k.trim().is_empty())
            .map(|k| parse_key("previous", k))
            .transpose()?;

        if current.is_none() && previous.is_some() {
            return Err(CipherError::MissingCurrentKey);
        }

        Ok(Self { current, previous })
    }

    /// Legacy plaintext cipher
    pub fn plaintext() -> Self {
        Self {
            current: None,
            previous: None,
        }
    }

    pub fn from_env() -> Result<Self, CipherError> {
        let current = std::env::var(CURRENT_KEY_ENV).ok();
        let previous = std::env::var(PREVIOUS_KEY_ENV).ok();
        Self::new(current.as_deref(), previous.as_deref())
    }

    pub fn is_plaintext(&self) -> bool {
        self.current.is_none()
    }

    pub fn has_previous(&self) -> bool {
        self.previous.is_some()
    }

    /// Seal a token under the current key (identity in plaintext mode)
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let Some(cipher) = &self.current else {
            return Ok(plaintext.to_string());
        };

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| CipherError::Encrypt(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    /// Open a stored value: current key first, then previous
    pub fn decrypt(&self, stored: &str) -> Result<Decrypted, CipherError> {
        let Some(current) = &self.current else {
            return Ok(Decrypted {
                plaintext: stored.to_string(),
                key: KeyUsed::Plaintext,
            });
        };

        let sealed = BASE64.decode(stored.trim()).map_err(|_| CipherError::Encoding)?;
        if sealed.len() <= NONCE_SIZE {
            return Err(CipherError::Truncated);
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);

        if let Ok(bytes) = current.decrypt(nonce, ciphertext) {
            return Ok(Decrypted {
                plaintext: String::from_utf8(bytes).map_err(|_| CipherError::Utf8)?,
                key: KeyUsed::Current,
            });
        }

        if let Some(previous) = &self.previous {
            if let Ok(bytes) = previous.decrypt(nonce, ciphertext) {
                return Ok(Decrypted {
                    plaintext: String::from_utf8(bytes).map_err(|_| CipherError::Utf8)?,
                    key: KeyUsed::Previous,
                });
            }
        }

        Err(CipherError::Decrypt)
    }

    /// True when the value opens under the current key
    pub fn is_current(&self, stored: &str) -> bool {
        matches!(
            self.decrypt(stored),
            Ok(Decrypted {
                key: KeyUsed::Current,
                ..
            })
        )
    }
}

fn parse_key(name: &'static str, encoded: &str) -> Result<Aes256Gcm, CipherError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| CipherError::InvalidKey {
            name,
            reason: format!("not base64: {}", e),
        })?;

    if bytes.len() != KEY_SIZE {
        return Err(CipherError::InvalidKey {
            name,
            reason: format!("must be {} bytes, got {}", KEY_SIZE, bytes.len()),
        });
    }

    Aes256Gcm::new_from_slice(&bytes).map_err(|e| CipherError::InvalidKey {
        name,
        reason: e.to_string(),
    })
}

/// Generate a random key, base64-encoded
pub fn generate_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    BASE64.encode(key)
}
