use carelink_crypto::{CryptoError, EncryptionService, FieldKey};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};

fn service() -> EncryptionService {
    EncryptionService::new(FieldKey::random())
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

// ── Single values ────────────────────────────────────────────────

#[test]
fn value_roundtrip_preserves_structure() {
    let svc = service();
    let value = json!({"conditions": ["diabetes", "copd"], "since": 2019});
    let sealed = svc.encrypt(&value).unwrap();
    assert!(EncryptionService::is_encrypted(&sealed));
    assert_eq!(svc.decrypt(&sealed).unwrap(), value);
}

#[test]
fn decrypt_rejects_plain_values() {
    let svc = service();
    assert!(matches!(
        svc.decrypt(&json!(42)),
        Err(CryptoError::Decryption(_))
    ));
    assert!(svc.decrypt(&json!("plain text")).is_err());
}

#[test]
fn decrypt_with_other_key_fails() {
    let sealed = service().encrypt(&json!("secret")).unwrap();
    assert!(service().decrypt(&sealed).is_err());
}

// ── Field allow-lists ────────────────────────────────────────────

#[test]
fn only_listed_fields_are_encrypted() {
    let svc = service();
    let record = json!({"nhsNumber": "943 476 5919", "status": "draft"});
    let sealed = svc.encrypt_fields(&record, &fields(&["nhsNumber"])).unwrap();

    assert!(EncryptionService::is_encrypted(&sealed["nhsNumber"]));
    assert_eq!(sealed["status"], json!("draft"));
    assert!(!sealed.to_string().contains("943 476 5919"));
}

#[test]
fn absent_and_null_fields_are_skipped() {
    let svc = service();
    let record = json!({"medicalHistory": null});
    let sealed = svc
        .encrypt_fields(&record, &fields(&["medicalHistory", "nhsNumber"]))
        .unwrap();
    assert_eq!(sealed, record);
}

#[test]
fn non_object_records_pass_through() {
    let svc = service();
    let record = json!(["a", "b"]);
    assert_eq!(svc.encrypt_fields(&record, &fields(&["a"])).unwrap(), record);
}

#[test]
fn decrypt_fields_leaves_legacy_plaintext_alone() {
    let svc = service();
    let record = json!({"notes": "written before encryption was enabled"});
    assert_eq!(svc.decrypt_fields(&record, &fields(&["notes"])).unwrap(), record);
}

#[test]
fn decrypt_fields_fails_on_tampered_field() {
    let svc = service();
    let sealed = svc
        .encrypt_fields(&json!({"notes": "x"}), &fields(&["notes"]))
        .unwrap();
    let other = service();
    assert!(other.decrypt_fields(&sealed, &fields(&["notes"])).is_err());
}

// ── Properties ───────────────────────────────────────────────────

fn leaf_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,200}".prop_map(Value::from),
    ]
}

fn record_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-z]{1,8}", leaf_strategy(), 0..8)
        .prop_map(|m| Value::Object(m.into_iter().collect()))
}

proptest! {
    /// decrypt(encrypt(fields(e))) == fields(e) for every record shape.
    #[test]
    fn field_roundtrip(record in record_strategy()) {
        let svc = service();
        let all: Vec<String> = record
            .as_object()
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        let sealed = svc.encrypt_fields(&record, &all).unwrap();
        prop_assert_eq!(svc.decrypt_fields(&sealed, &all).unwrap(), record);
    }
}
