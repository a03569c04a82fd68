//! At-rest encryption for client configuration blobs.
//!
//! Uses AES-256-GCM with a single process-wide key supplied via
//! configuration. Tokens are `base64(nonce || ciphertext)`; decryption of a
//! malformed or tampered token returns `None` rather than an error so the
//! caller can surface a generic failure.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

/// Key size in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// AES-GCM nonce size in bytes.
const NONCE_SIZE: usize = 12;

#[derive(Clone)]
pub struct SecretBox {
    key: [u8; KEY_SIZE],
}

impl std::fmt::Debug for SecretBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBox").finish_non_exhaustive()
    }
}

impl SecretBox {
    /// Build a secret box from a base64-encoded 32-byte key.
    pub fn new(key_b64: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(key_b64.trim())
            .context("config encryption key is not valid base64")?;
        if bytes.len() != KEY_SIZE {
            bail!(
                "config encryption key must be {KEY_SIZE} bytes, got {}",
                bytes.len()
            );
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Generate a fresh random key, base64-encoded, for operator setup.
    #[must_use]
    pub fn generate_key() -> String {
        use rand::Rng;
        let key: [u8; KEY_SIZE] = rand::rng().random();
        BASE64.encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String> {
        use rand::Rng;

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let nonce_bytes: [u8; NONCE_SIZE] = rand::rng().random();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("config encryption failed: {e}"))?;

        let mut token = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        token.extend_from_slice(&nonce_bytes);
        token.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(token))
    }

    /// Decrypt a token produced by [`Self::encrypt`]. Returns `None` for
    /// malformed, truncated, or tampered tokens.
    #[must_use]
    pub fn decrypt(&self, token: &str) -> Option<String> {
        let raw = BASE64.decode(token.trim()).ok()?;
        if raw.len() <= NONCE_SIZE {
            return None;
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_SIZE);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}
