use carelink_storage::{CompressionService, StorageError, COMPRESSED_PREFIX, DEFAULT_THRESHOLD};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::{json, Value};

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn long_text(len: usize) -> String {
    "Resident settled well after lunch; mobility unchanged. "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

// ── Threshold ────────────────────────────────────────────────────

#[test]
fn default_threshold_is_one_kib() {
    let svc = CompressionService::default();
    assert_eq!(svc.threshold(), DEFAULT_THRESHOLD);
    assert!(!svc.should_compress(1024));
    assert!(svc.should_compress(1025));
}

#[test]
fn small_values_pass_through() {
    let svc = CompressionService::default();
    let v = json!("short note");
    assert_eq!(svc.compress(&v).unwrap(), v);
}

// ── Round trips ──────────────────────────────────────────────────

#[test]
fn two_kib_text_round_trips_exactly() {
    let svc = CompressionService::default();
    let text = long_text(2048);
    let v = json!(text);

    let packed = svc.compress(&v).unwrap();
    assert!(CompressionService::is_compressed(&packed));
    assert!(packed.as_str().unwrap().starts_with(COMPRESSED_PREFIX));
    assert!(packed.as_str().unwrap().len() < text.len());

    assert_eq!(svc.decompress(&packed).unwrap(), v);
}

#[test]
fn structured_values_round_trip() {
    let svc = CompressionService::new(16);
    let v = json!({"answers": [1, 2, 3], "comment": long_text(200)});
    let packed = svc.compress(&v).unwrap();
    assert!(CompressionService::is_compressed(&packed));
    assert_eq!(svc.decompress(&packed).unwrap(), v);
}

#[test]
fn decompress_of_plain_value_is_identity() {
    let svc = CompressionService::default();
    let v = json!({"a": 1});
    assert_eq!(svc.decompress(&v).unwrap(), v);
}

#[test]
fn corrupt_payload_is_a_decode_error() {
    let svc = CompressionService::default();
    let bad = json!(format!("{COMPRESSED_PREFIX}AAAAAAAA"));
    assert!(matches!(svc.decompress(&bad), Err(StorageError::Decode(_))));
}

// ── Field allow-lists ────────────────────────────────────────────

#[test]
fn only_listed_fields_are_compressed() {
    let svc = CompressionService::default();
    let record = json!({"notes": long_text(4000), "summary": long_text(4000)});
    let packed = svc.compress_fields(&record, &fields(&["notes"])).unwrap();

    assert!(CompressionService::is_compressed(&packed["notes"]));
    assert_eq!(packed["summary"], record["summary"]);
    assert_eq!(svc.decompress_fields(&packed, &fields(&["notes"])).unwrap(), record);
}

// ── Properties ───────────────────────────────────────────────────

fn record_strategy() -> impl Strategy<Value = Value> {
    prop::collection::btree_map(
        "[a-z]{1,6}",
        prop_oneof![
            "[ -~]{0,64}".prop_map(Value::from),
            "[ -~]{1024,3000}".prop_map(Value::from),
            any::<i32>().prop_map(Value::from),
        ],
        0..5,
    )
    .prop_map(|m| Value::Object(m.into_iter().collect()))
}

proptest! {
    /// decompress(compress(fields(e))) == fields(e) on both sides of the threshold.
    #[test]
    fn field_roundtrip(record in record_strategy()) {
        let svc = CompressionService::default();
        let all: Vec<String> = record.as_object().unwrap().keys().cloned().collect();
        let packed = svc.compress_fields(&record, &all).unwrap();
        prop_assert_eq!(svc.decompress_fields(&packed, &all).unwrap(), record);
    }
}
