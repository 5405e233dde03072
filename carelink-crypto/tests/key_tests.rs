use carelink_crypto::{
    derive_key, generate_key, CryptoError, FieldKey, KdfParams, KeyConfig, KEY_ENV, KEY_SIZE,
    PASSPHRASE_ENV, SALT_ENV,
};
use serial_test::serial;

fn fast_kdf_params() -> KdfParams {
    KdfParams {
        memory_cost: 1024,
        time_cost: 1,
        parallelism: 1,
    }
}

fn clear_env() {
    // SAFETY: tests touching the environment are serialized.
    unsafe {
        std::env::remove_var(KEY_ENV);
        std::env::remove_var(PASSPHRASE_ENV);
        std::env::remove_var(SALT_ENV);
    }
}

// ── generate_key ─────────────────────────────────────────────────

#[test]
fn generate_key_has_requested_length() {
    assert_eq!(generate_key(16).len(), 16);
    assert_eq!(generate_key(64).len(), 64);
    assert!(generate_key(0).is_empty());
}

#[test]
fn generated_keys_differ() {
    assert_ne!(generate_key(32), generate_key(32));
}

// ── FieldKey ─────────────────────────────────────────────────────

#[test]
fn from_slice_checks_length() {
    let err = FieldKey::from_slice(&[0u8; 16]).unwrap_err();
    assert!(matches!(
        err,
        CryptoError::InvalidKeyLength { expected: KEY_SIZE, actual: 16 }
    ));
}

#[test]
fn base64_roundtrip() {
    let key = FieldKey::random();
    let back = FieldKey::from_base64(&key.to_base64()).unwrap();
    assert_eq!(back.as_bytes(), key.as_bytes());
}

#[test]
fn debug_redacts_key() {
    let dbg = format!("{:?}", FieldKey::random());
    assert!(dbg.contains("REDACTED"));
}

// ── derive_key ───────────────────────────────────────────────────

#[test]
fn derivation_is_deterministic() {
    let a = derive_key("hunter2", b"care-home-salt", &fast_kdf_params()).unwrap();
    let b = derive_key("hunter2", b"care-home-salt", &fast_kdf_params()).unwrap();
    assert_eq!(a.as_bytes(), b.as_bytes());
}

#[test]
fn different_salts_give_different_keys() {
    let a = derive_key("hunter2", b"salt-one-xx", &fast_kdf_params()).unwrap();
    let b = derive_key("hunter2", b"salt-two-xx", &fast_kdf_params()).unwrap();
    assert_ne!(a.as_bytes(), b.as_bytes());
}

#[test]
fn short_salt_is_rejected() {
    assert!(matches!(
        derive_key("pw", b"abc", &fast_kdf_params()),
        Err(CryptoError::KeyDerivation(_))
    ));
}

// ── KeyConfig ────────────────────────────────────────────────────

#[test]
#[serial]
fn missing_secret_is_an_error() {
    clear_env();
    let err = KeyConfig::from_env().resolve().unwrap_err();
    assert!(matches!(err, CryptoError::MissingKey(KEY_ENV)));
}

#[test]
#[serial]
fn raw_key_from_env() {
    clear_env();
    let key = FieldKey::random();
    unsafe { std::env::set_var(KEY_ENV, key.to_base64()) };
    let resolved = KeyConfig::from_env().resolve().unwrap();
    assert_eq!(resolved.as_bytes(), key.as_bytes());
    clear_env();
}

#[test]
#[serial]
fn passphrase_without_salt_is_an_error() {
    clear_env();
    unsafe { std::env::set_var(PASSPHRASE_ENV, "correct horse") };
    let err = KeyConfig::from_env().resolve().unwrap_err();
    assert!(matches!(err, CryptoError::MissingKey(SALT_ENV)));
    clear_env();
}

#[test]
fn passphrase_config_derives_key() {
    let config = KeyConfig {
        passphrase: Some("correct horse".into()),
        salt: Some("battery-staple".into()),
        kdf: fast_kdf_params(),
        ..Default::default()
    };
    let expected = derive_key("correct horse", b"battery-staple", &fast_kdf_params()).unwrap();
    assert_eq!(config.resolve().unwrap().as_bytes(), expected.as_bytes());
}

#[test]
fn config_debug_redacts_secrets() {
    let config = KeyConfig {
        key: Some("c2VjcmV0".into()),
        ..Default::default()
    };
    let dbg = format!("{config:?}");
    assert!(!dbg.contains("c2VjcmV0"));
}
