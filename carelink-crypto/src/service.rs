//! Field-level encryption of JSON records.

use crate::cipher::{self, EncryptedData};
use crate::error::{CryptoError, CryptoResult};
use crate::key::FieldKey;
use serde_json::Value;
use std::sync::Arc;

/// Encrypts and decrypts individual JSON values and allow-listed record fields.
///
/// Cheap to clone; clones share the key.
#[derive(Clone, Debug)]
pub struct EncryptionService {
    key: Arc<FieldKey>,
}

impl EncryptionService {
    pub fn new(key: FieldKey) -> Self {
        Self { key: Arc::new(key) }
    }

    /// Encrypts any JSON value into an `enc:v1:` string.
    pub fn encrypt(&self, value: &Value) -> CryptoResult<Value> {
        let plaintext = serde_json::to_vec(value)?;
        let encrypted = cipher::encrypt(&self.key, &plaintext)?;
        Ok(Value::String(encrypted.encode()))
    }

    /// Reverses [`EncryptionService::encrypt`].
    ///
    /// Fails on anything that is not an encrypted string produced under this key.
    pub fn decrypt(&self, value: &Value) -> CryptoResult<Value> {
        let encoded = value
            .as_str()
            .ok_or_else(|| CryptoError::Decryption("encrypted value must be a string".into()))?;
        let encrypted = EncryptedData::decode(encoded)?;
        let plaintext = cipher::decrypt(&self.key, &encrypted)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    /// Whether a value carries the encryption marker.
    pub fn is_encrypted(value: &Value) -> bool {
        value.as_str().is_some_and(EncryptedData::is_encoded)
    }

    /// Encrypts the listed top-level fields of `record`, leaving every other
    /// field untouched. Absent and null fields are skipped.
    pub fn encrypt_fields(&self, record: &Value, fields: &[String]) -> CryptoResult<Value> {
        let mut out = record.clone();
        let Some(map) = out.as_object_mut() else {
            return Ok(out);
        };
        for field in fields {
            if let Some(slot) = map.get_mut(field) {
                if slot.is_null() {
                    continue;
                }
                *slot = self.encrypt(slot)?;
            }
        }
        Ok(out)
    }

    /// Decrypts the listed top-level fields of `record`.
    ///
    /// Listed fields without the encryption marker are left as they are, so
    /// records written before a field joined the list still read back.
    pub fn decrypt_fields(&self, record: &Value, fields: &[String]) -> CryptoResult<Value> {
        let mut out = record.clone();
        let Some(map) = out.as_object_mut() else {
            return Ok(out);
        };
        for field in fields {
            if let Some(slot) = map.get_mut(field) {
                if Self::is_encrypted(slot) {
                    *slot = self.decrypt(slot)?;
                }
            }
        }
        Ok(out)
    }
}
