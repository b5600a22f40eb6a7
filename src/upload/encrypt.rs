use crate::errors::{FlowError, FlowResult};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

pub const KEY_LENGTH: usize = 32; // AES-256
pub const IV_LENGTH: usize = 12;

/// Caller-supplied upload key, zeroed on drop
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct EncryptionKey {
    key_bytes: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    pub fn from_bytes(key_bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key_bytes }
    }

    pub fn from_slice(bytes: &[u8]) -> FlowResult<Self> {
        let key_bytes: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            FlowError::Config(format!(
                "encryption key must be {} bytes, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key_bytes })
    }

    /// Parse a standard base64 encoded key
    pub fn from_base64(encoded: &str) -> FlowResult<Self> {
        let mut bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| FlowError::Config(format!("invalid encryption key: {}", e)))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }

    pub fn generate() -> Self {
        let mut key_bytes = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key_bytes);
        Self { key_bytes }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key_bytes))
    }
}

/// Fresh random IV, one per uploaded field
pub fn generate_iv() -> [u8; IV_LENGTH] {
    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// AES-256-GCM encrypt. Output is ciphertext followed by the auth tag.
pub fn encrypt(key: &EncryptionKey, iv: &[u8; IV_LENGTH], plaintext: &[u8]) -> FlowResult<Vec<u8>> {
    key.cipher()
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| FlowError::Unknown("encryption failed".to_string()))
}

pub fn decrypt(key: &EncryptionKey, iv: &[u8; IV_LENGTH], ciphertext: &[u8]) -> FlowResult<Vec<u8>> {
    key.cipher()
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| FlowError::Unknown("decryption failed".to_string()))
}
