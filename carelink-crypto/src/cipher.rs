//! Value encryption using ChaCha20-Poly1305.
//!
//! Every call draws a fresh random nonce, so encrypting the same plaintext
//! twice yields different ciphertexts.

use crate::error::{CryptoError, CryptoResult};
use crate::key::FieldKey;
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;

/// Size of nonce in bytes (96 bits for ChaCha20-Poly1305).
pub const NONCE_SIZE: usize = 12;

/// Size of authentication tag in bytes.
pub const TAG_SIZE: usize = 16;

/// Marker prepended to every encrypted string so readers can tell it apart
/// from plaintext without external metadata.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Encrypted bytes together with the nonce needed to decrypt them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedData {
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext including the auth tag.
    pub ciphertext: Vec<u8>,
}

impl EncryptedData {
    /// Returns the total encoded size in bytes.
    pub fn len(&self) -> usize {
        NONCE_SIZE + self.ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ciphertext.is_empty()
    }

    /// Encodes as `enc:v1:` + base64(nonce ‖ ciphertext).
    pub fn encode(&self) -> String {
        let mut bytes = Vec::with_capacity(self.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        format!("{ENCRYPTED_PREFIX}{}", STANDARD.encode(&bytes))
    }

    /// Decodes a string produced by [`EncryptedData::encode`].
    pub fn decode(encoded: &str) -> CryptoResult<Self> {
        let body = encoded
            .strip_prefix(ENCRYPTED_PREFIX)
            .ok_or_else(|| CryptoError::Decryption("missing encryption marker".to_string()))?;
        let bytes = STANDARD
            .decode(body)
            .map_err(|e| CryptoError::Decryption(format!("invalid base64: {e}")))?;

        if bytes.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Decryption("data too short".to_string()));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&bytes[..NONCE_SIZE]);
        let ciphertext = bytes[NONCE_SIZE..].to_vec();

        Ok(Self { nonce, ciphertext })
    }

    /// Cheap check for the encryption marker.
    pub fn is_encoded(value: &str) -> bool {
        value.starts_with(ENCRYPTED_PREFIX)
    }
}

/// Encrypts plaintext bytes.
pub fn encrypt(key: &FieldKey, plaintext: &[u8]) -> CryptoResult<EncryptedData> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    Ok(EncryptedData {
        nonce: nonce_bytes,
        ciphertext,
    })
}

/// Decrypts bytes produced by [`encrypt`] under the same key.
pub fn decrypt(key: &FieldKey, encrypted: &EncryptedData) -> CryptoResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(&encrypted.nonce);

    cipher
        .decrypt(nonce, encrypted.ciphertext.as_ref())
        .map_err(|_| {
            CryptoError::Decryption("decryption failed (wrong key or tampered data)".to_string())
        })
}
