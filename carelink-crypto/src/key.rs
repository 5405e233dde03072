//! Key material and its provisioning.
//!
//! The field key is never compiled in. [`KeyConfig`] resolves it from the
//! environment at startup, either as raw base64 key bytes or as a passphrase
//! stretched with Argon2id.

use crate::error::{CryptoError, CryptoResult};
use argon2::{Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of encryption keys in bytes (256 bits for ChaCha20).
pub const KEY_SIZE: usize = 32;

/// Minimum salt length accepted for passphrase derivation.
pub const MIN_SALT_SIZE: usize = 8;

/// Environment variable holding a base64-encoded 32-byte key.
pub const KEY_ENV: &str = "CARELINK_ENCRYPTION_KEY";
/// Environment variable holding a passphrase to derive the key from.
pub const PASSPHRASE_ENV: &str = "CARELINK_ENCRYPTION_PASSPHRASE";
/// Environment variable holding the salt paired with the passphrase.
pub const SALT_ENV: &str = "CARELINK_ENCRYPTION_SALT";

/// The process-wide field encryption key. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FieldKey {
    bytes: [u8; KEY_SIZE],
}

impl FieldKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Builds a key from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes: arr })
    }

    /// Decodes a base64 key string.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|e| CryptoError::KeyDerivation(format!("invalid base64 key: {e}")))?;
        let key = Self::from_slice(&raw);
        raw.zeroize();
        key
    }

    /// A fresh random key.
    pub fn random() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Base64 form, for handing a freshly generated key to provisioning tooling.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Returns `length` bytes from the OS RNG.
///
/// Used by provisioning and key rotation tooling; the storage pipeline never
/// calls it.
pub fn generate_key(length: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; length];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Argon2id cost parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub memory_cost: u32,
    /// Time cost (iterations).
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        // OWASP recommendations for Argon2id
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

/// Derives a field key from a passphrase using Argon2id.
pub fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> CryptoResult<FieldKey> {
    if salt.len() < MIN_SALT_SIZE {
        return Err(CryptoError::KeyDerivation(format!(
            "salt must be at least {MIN_SALT_SIZE} bytes"
        )));
    }

    let argon2_params = Params::new(
        params.memory_cost,
        params.time_cost,
        params.parallelism,
        Some(KEY_SIZE),
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key_bytes)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let key = FieldKey::from_bytes(key_bytes);
    key_bytes.zeroize();
    Ok(key)
}

/// Where the field key comes from.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct KeyConfig {
    /// Base64-encoded 32-byte key. Takes precedence over the passphrase.
    #[serde(default, skip_serializing)]
    pub key: Option<String>,
    #[serde(default, skip_serializing)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,
    #[serde(default)]
    pub kdf: KdfParams,
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("salt", &self.salt)
            .field("kdf", &self.kdf)
            .finish()
    }
}

impl KeyConfig {
    /// Reads the key settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            key: std::env::var(KEY_ENV).ok().filter(|s| !s.is_empty()),
            passphrase: std::env::var(PASSPHRASE_ENV).ok().filter(|s| !s.is_empty()),
            salt: std::env::var(SALT_ENV).ok().filter(|s| !s.is_empty()),
            kdf: KdfParams::default(),
        }
    }

    /// Resolves the configured secret into a key.
    pub fn resolve(&self) -> CryptoResult<FieldKey> {
        if let Some(key) = &self.key {
            return FieldKey::from_base64(key);
        }
        match (&self.passphrase, &self.salt) {
            (Some(passphrase), Some(salt)) => derive_key(passphrase, salt.as_bytes(), &self.kdf),
            (Some(_), None) => Err(CryptoError::MissingKey(SALT_ENV)),
            _ => Err(CryptoError::MissingKey(KEY_ENV)),
        }
    }
}
