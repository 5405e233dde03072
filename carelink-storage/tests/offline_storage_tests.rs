use carelink_crypto::{EncryptionService, FieldKey};
use carelink_merge::{ConflictResolver, MergeError, ResolutionStrategy};
use carelink_model::{ChangeKind, Entity, EntityType, FieldSchema, FieldSchemaTable};
use carelink_storage::{
    CompressionService, KvStore, MemoryStore, OfflineStorage, SqliteStore, StorageConfig,
    StorageError, PENDING_CHANGES_KEY,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;

fn long_text(len: usize) -> String {
    "Observed: eating well, pressure area intact. ".chars().cycle().take(len).collect()
}

fn make_storage() -> (OfflineStorage, Arc<MemoryStore>) {
    let backend = Arc::new(MemoryStore::new());
    let storage = OfflineStorage::with_backend(
        backend.clone(),
        &StorageConfig::default(),
        EncryptionService::new(FieldKey::random()),
        Arc::new(ConflictResolver::default()),
    );
    (storage, backend)
}

fn assessment(id: &str, data: Value) -> Entity {
    Entity::new(EntityType::Assessment, id, data)
}

// ── Save / get ───────────────────────────────────────────────────

#[test]
fn save_then_get_returns_plain_entity() {
    let (storage, _) = make_storage();
    let entity = assessment(
        "a1",
        json!({
            "status": "draft",
            "nhsNumber": "943 476 5919",
            "notes": long_text(3000),
            "responses": {"q1": "yes"}
        }),
    );
    storage.save(&entity).unwrap();

    let loaded = storage.get(EntityType::Assessment, "a1").unwrap().unwrap();
    assert_eq!(loaded, entity);
}

#[test]
fn get_missing_returns_none() {
    let (storage, _) = make_storage();
    assert!(storage.get(EntityType::Visit, "nope").unwrap().is_none());
}

#[test]
fn sensitive_fields_never_stored_in_plaintext() {
    let (storage, backend) = make_storage();
    let entity = assessment(
        "a1",
        json!({"nhsNumber": "943 476 5919", "medicalHistory": ["asthma"], "status": "draft"}),
    );
    storage.save(&entity).unwrap();

    let raw = backend.get("assessment_a1").unwrap().unwrap();
    assert!(!raw.contains("943 476 5919"));
    assert!(!raw.contains("asthma"));
    assert!(raw.contains("draft"));

    let log = backend.get(PENDING_CHANGES_KEY).unwrap().unwrap();
    assert!(!log.contains("943 476 5919"));
}

#[test]
fn overlapping_field_is_compressed_then_encrypted() {
    let (storage, backend) = make_storage();
    let notes = long_text(5000);
    storage
        .save(&assessment("a1", json!({"notes": notes})))
        .unwrap();

    let raw: Entity = serde_json::from_str(&backend.get("assessment_a1").unwrap().unwrap()).unwrap();
    assert!(EncryptionService::is_encrypted(&raw.data["notes"]));
    // The sealed form is of the deflated text, so it is much smaller.
    assert!(raw.data["notes"].as_str().unwrap().len() < notes.len());

    let loaded = storage.get(EntityType::Assessment, "a1").unwrap().unwrap();
    assert_eq!(loaded.data["notes"], json!(notes));
}

#[test]
fn get_all_lists_one_type_only() {
    let (storage, _) = make_storage();
    storage.save(&assessment("a1", json!({}))).unwrap();
    storage.save(&assessment("a2", json!({}))).unwrap();
    storage
        .save(&Entity::new(EntityType::Visit, "v1", json!({})))
        .unwrap();

    let ids: Vec<String> = storage
        .get_all(EntityType::Assessment)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(ids, vec!["a1", "a2"]);
}

// ── Lenient decode ───────────────────────────────────────────────

#[test]
fn undecryptable_field_degrades_to_raw_value() {
    let backend = Arc::new(MemoryStore::new());
    let config = StorageConfig::default();
    let writer = OfflineStorage::with_backend(
        backend.clone(),
        &config,
        EncryptionService::new(FieldKey::random()),
        Arc::new(ConflictResolver::default()),
    );
    writer
        .save(&assessment("a1", json!({"nhsNumber": "x", "status": "draft"})))
        .unwrap();

    // Same store, different key: the sensitive field cannot be opened.
    let reader = OfflineStorage::with_backend(
        backend,
        &config,
        EncryptionService::new(FieldKey::random()),
        Arc::new(ConflictResolver::default()),
    );
    let loaded = reader.get(EntityType::Assessment, "a1").unwrap().unwrap();
    assert_eq!(loaded.data["status"], json!("draft"));
    assert!(EncryptionService::is_encrypted(&loaded.data["nhsNumber"]));
}

#[test]
fn corrupt_record_does_not_block_listing() {
    let (storage, backend) = make_storage();
    storage.save(&assessment("good", json!({}))).unwrap();
    backend.put("assessment_bad", "{not json").unwrap();

    let all = storage.get_all(EntityType::Assessment).unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, "good");
}

#[test]
fn corrupt_compressed_field_degrades_to_raw_value() {
    let (storage, backend) = make_storage();
    let stored = Entity::new(
        EntityType::Visit,
        "v1",
        json!({"observations": "deflate:!!!"}),
    );
    backend
        .put("visit_v1", &serde_json::to_string(&stored).unwrap())
        .unwrap();

    let loaded = storage.get(EntityType::Visit, "v1").unwrap().unwrap();
    assert_eq!(loaded.data["observations"], json!("deflate:!!!"));
}

// ── Pending changes ──────────────────────────────────────────────

#[test]
fn save_logs_create_then_update() {
    let (storage, _) = make_storage();
    let mut entity = assessment("a1", json!({"status": "draft"}));
    assert_eq!(storage.save(&entity).unwrap().kind, ChangeKind::Create);
    entity.touch();
    assert_eq!(storage.save(&entity).unwrap().kind, ChangeKind::Update);

    let changes = storage.pending_changes().unwrap();
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| !c.synced));
}

#[test]
fn pending_change_payload_is_transformed() {
    let (storage, _) = make_storage();
    let change = storage
        .save(&assessment("a1", json!({"nhsNumber": "943"})))
        .unwrap();
    assert!(EncryptionService::is_encrypted(&change.payload["data"]["nhsNumber"]));
}

#[test]
fn mark_change_synced_keeps_audit_trail() {
    let (storage, _) = make_storage();
    storage.save(&assessment("a1", json!({}))).unwrap();
    storage.save(&assessment("a2", json!({}))).unwrap();

    assert_eq!(storage.mark_change_synced(EntityType::Assessment, "a1").unwrap(), 1);
    assert_eq!(storage.mark_change_synced(EntityType::Assessment, "a1").unwrap(), 0);

    let all = storage.pending_changes().unwrap();
    assert_eq!(all.len(), 2);
    let unsynced = storage.unsynced_changes().unwrap();
    assert_eq!(unsynced.len(), 1);
    assert_eq!(unsynced[0].entity_id, "a2");
}

#[test]
fn mark_synced_through_leaves_later_edits_pending() {
    let (storage, _) = make_storage();
    let mut entity = assessment("a1", json!({"status": "draft"}));
    let first = storage.save(&entity).unwrap();
    storage.save(&assessment("a2", json!({}))).unwrap();
    assert_eq!(
        storage.latest_change_id(EntityType::Assessment, "a1").unwrap(),
        Some(first.change_id.clone())
    );

    entity.touch();
    entity.data["status"] = json!("submitted");
    let second = storage.save(&entity).unwrap();

    let flipped = storage
        .mark_changes_synced_through(EntityType::Assessment, "a1", &first.change_id)
        .unwrap();
    assert_eq!(flipped, 1);

    let unsynced: Vec<String> = storage
        .unsynced_changes()
        .unwrap()
        .into_iter()
        .map(|c| c.change_id)
        .collect();
    assert_eq!(unsynced.len(), 2);
    assert!(unsynced.contains(&second.change_id));
    assert!(!unsynced.contains(&first.change_id));
}

#[test]
fn mark_synced_through_unknown_change_flips_nothing() {
    let (storage, _) = make_storage();
    storage.save(&assessment("a1", json!({}))).unwrap();
    let flipped = storage
        .mark_changes_synced_through(EntityType::Assessment, "a1", "gone")
        .unwrap();
    assert_eq!(flipped, 0);
    assert_eq!(storage.unsynced_changes().unwrap().len(), 1);
    assert_eq!(storage.latest_change_id(EntityType::Visit, "a1").unwrap(), None);
}

#[test]
fn delete_logs_delete_change() {
    let (storage, _) = make_storage();
    storage.save(&assessment("a1", json!({}))).unwrap();
    assert!(storage.delete(EntityType::Assessment, "a1").unwrap());
    assert!(!storage.delete(EntityType::Assessment, "a1").unwrap());
    assert!(storage.get(EntityType::Assessment, "a1").unwrap().is_none());

    let kinds: Vec<ChangeKind> = storage
        .pending_changes()
        .unwrap()
        .into_iter()
        .map(|c| c.kind)
        .collect();
    assert_eq!(kinds, vec![ChangeKind::Create, ChangeKind::Delete]);
}

// ── Conflicts ────────────────────────────────────────────────────

#[test]
fn resolve_conflict_passes_through_to_resolver() {
    let (storage, _) = make_storage();
    let client = assessment("a1", json!({"status": "draft"}));
    let server = assessment("a1", json!({"status": "submitted"}));

    let (merged, meta) = storage
        .resolve_conflict(&client, &server, Some(ResolutionStrategy::ServerWins))
        .unwrap();
    assert_eq!(meta.conflict_field_paths, vec!["status"]);
    assert_eq!(merged.data, json!({"status": "submitted"}));
}

#[test]
fn resolve_conflict_surfaces_missing_manual_resolver() {
    let (storage, _) = make_storage();
    let client = assessment("a1", json!({"a": 1}));
    let server = assessment("a1", json!({"a": 2}));
    let err = storage
        .resolve_conflict(&client, &server, Some(ResolutionStrategy::ManualMerge))
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::Merge(MergeError::ResolverNotFound(EntityType::Assessment))
    ));
}

// ── Administration ───────────────────────────────────────────────

#[test]
fn clear_storage_removes_everything() {
    let (storage, _) = make_storage();
    storage.save(&assessment("a1", json!({}))).unwrap();
    assert!(storage.storage_size().unwrap() > 0);

    storage.clear_storage().unwrap();
    assert_eq!(storage.storage_size().unwrap(), 0);
    assert!(storage.pending_changes().unwrap().is_empty());
}

#[test]
fn custom_schema_table_is_honoured() {
    let config = StorageConfig {
        compression_threshold: 8,
        schemas: FieldSchemaTable::empty()
            .with(EntityType::Visit, FieldSchema::new(["body"], Vec::<String>::new())),
        ..Default::default()
    };
    let backend = Arc::new(MemoryStore::new());
    let storage = OfflineStorage::with_backend(
        backend.clone(),
        &config,
        EncryptionService::new(FieldKey::random()),
        Arc::new(ConflictResolver::default()),
    );
    let entity = Entity::new(EntityType::Visit, "v1", json!({"body": long_text(64)}));
    storage.save(&entity).unwrap();

    let raw: Entity = serde_json::from_str(&backend.get("visit_v1").unwrap().unwrap()).unwrap();
    assert!(CompressionService::is_compressed(&raw.data["body"]));
    assert_eq!(storage.get(EntityType::Visit, "v1").unwrap().unwrap(), entity);
}

// ── SQLite backend ───────────────────────────────────────────────

#[test]
fn sqlite_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("carelink.db");
    let key = FieldKey::random();
    let config = StorageConfig {
        path: Some(path.clone()),
        ..Default::default()
    };
    let entity = assessment("a1", json!({"nhsNumber": "943", "status": "draft"}));

    {
        let storage = OfflineStorage::open(
            &config,
            EncryptionService::new(key.clone()),
            Arc::new(ConflictResolver::default()),
        )
        .unwrap();
        storage.save(&entity).unwrap();
    }

    let storage = OfflineStorage::open(
        &config,
        EncryptionService::new(key),
        Arc::new(ConflictResolver::default()),
    )
    .unwrap();
    assert_eq!(storage.get(EntityType::Assessment, "a1").unwrap().unwrap(), entity);
    assert_eq!(storage.unsynced_changes().unwrap().len(), 1);
}

#[test]
fn sqlite_stores_are_scoped_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let a = SqliteStore::open(&path, "app-a").unwrap();
    let b = SqliteStore::open(&path, "app-b").unwrap();

    a.put("visit_1", "{}").unwrap();
    assert_eq!(b.get("visit_1").unwrap(), None);
    assert_eq!(a.scan_prefix("visit_").unwrap().len(), 1);

    b.clear().unwrap();
    assert!(a.get("visit_1").unwrap().is_some());
}

#[test]
fn sqlite_scan_and_size() {
    let store = SqliteStore::open_in_memory("t").unwrap();
    store.put("visit_b", "2").unwrap();
    store.put("visit_a", "1").unwrap();
    store.put("assessment_a", "3").unwrap();

    let keys: Vec<String> = store
        .scan_prefix("visit_")
        .unwrap()
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(keys, vec!["visit_a", "visit_b"]);
    assert_eq!(store.size_bytes().unwrap(), (8 + 8 + 13) as u64);
    assert!(store.delete("visit_a").unwrap());
    assert!(!store.delete("visit_a").unwrap());
}
