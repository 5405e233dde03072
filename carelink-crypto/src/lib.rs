//! Field-level encryption for CareLink records.
//!
//! Sensitive fields (medical history, identifiers) are encrypted before they
//! touch the on-device store.
//!
//! # Security Model
//!
//! - **Cipher**: ChaCha20-Poly1305 AEAD with a random nonce per value
//! - **Key**: one 256-bit field key per process, supplied by configuration
//!   or derived from a passphrase with Argon2id
//! - **Zeroization**: key material is wiped from memory on drop
//!
//! # Example
//!
//! ```
//! use carelink_crypto::{EncryptionService, FieldKey};
//! use serde_json::json;
//!
//! let service = EncryptionService::new(FieldKey::random());
//! let record = json!({"nhsNumber": "943 476 5919", "room": 12});
//! let fields = vec!["nhsNumber".to_string()];
//!
//! let sealed = service.encrypt_fields(&record, &fields).unwrap();
//! assert_ne!(sealed["nhsNumber"], record["nhsNumber"]);
//! assert_eq!(service.decrypt_fields(&sealed, &fields).unwrap(), record);
//! ```

mod cipher;
mod error;
mod key;
mod service;

pub use cipher::{decrypt, encrypt, EncryptedData, ENCRYPTED_PREFIX, NONCE_SIZE, TAG_SIZE};
pub use error::{CryptoError, CryptoResult};
pub use key::{
    derive_key, generate_key, FieldKey, KdfParams, KeyConfig, KEY_ENV, KEY_SIZE, MIN_SALT_SIZE,
    PASSPHRASE_ENV, SALT_ENV,
};
pub use service::EncryptionService;
