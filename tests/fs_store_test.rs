use satchel::{FileStore, KvStore, MemStore, Satchel, SatchelError};
use serde_json::json;
use std::fs;
use tempfile::TempDir;

fn setup() -> (TempDir, FileStore) {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn test_basic_io() {
    let (_dir, store) = setup();

    store.set("greeting", "hello").unwrap();
    assert_eq!(store.get("greeting"), Some("hello".to_string()));
    assert_eq!(store.len(), 1);

    store.remove("greeting");
    assert_eq!(store.get("greeting"), None);
    assert!(store.is_empty());
}

#[test]
fn test_values_survive_reopen() {
    let (dir, store) = setup();
    store.set("user-1", r#"{"id":"u1"}"#).unwrap();
    drop(store);

    let reopened = FileStore::open(dir.path()).unwrap();
    assert_eq!(reopened.get("user-1"), Some(r#"{"id":"u1"}"#.to_string()));
}

#[test]
fn test_no_tmp_artifacts_left_behind() {
    let (dir, store) = setup();
    store.set("a", "1").unwrap();
    store.set("b", "2").unwrap();
    store.remove("a");

    let entries = fs::read_dir(dir.path()).unwrap();
    for entry in entries {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(!name.ends_with(".tmp"), "Found leftover tmp file: {}", name);
    }
}

#[test]
fn test_quota_enforced() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap().with_quota(16);

    store.set("k", "123456789012345").unwrap(); // exactly 16 bytes

    let err = store.set("another", "value").unwrap_err();
    assert!(matches!(err, SatchelError::CapacityExceeded(_)));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_corrupt_data_file_starts_empty() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("data.json"), "{definitely not json").unwrap();

    let store = FileStore::open(dir.path()).unwrap();
    assert!(store.is_empty());

    // And the store is usable again
    store.set("fresh", "start").unwrap();
    assert_eq!(store.get("fresh"), Some("start".to_string()));
}

#[test]
fn test_key_iteration_view() {
    let (_dir, store) = setup();
    store.set("beta", "2").unwrap();
    store.set("alpha", "1").unwrap();

    assert_eq!(store.key_at(0), Some("alpha".to_string()));
    assert_eq!(store.key_at(1), Some("beta".to_string()));
    assert_eq!(store.key_at(2), None);
}

#[test]
fn test_facade_over_file_store() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap();
    let satchel = Satchel::new(store, MemStore::new());

    assert!(satchel.save("status-post", &json!({"id": "s1", "text": "hi"})));
    assert_eq!(
        satchel.load("status-post"),
        Some(json!({"id": "s1", "text": "hi"}))
    );

    // A fresh facade over the same directory sees the value
    let satchel = Satchel::new(FileStore::open(dir.path()).unwrap(), MemStore::new());
    assert_eq!(
        satchel.load("status-post"),
        Some(json!({"id": "s1", "text": "hi"}))
    );
}

#[test]
fn test_facade_spills_when_file_store_full() {
    let dir = TempDir::new().unwrap();
    let store = FileStore::open(dir.path()).unwrap().with_quota(48);
    let satchel = Satchel::new(store, MemStore::new());

    let value = json!({ "text": "x".repeat(400) });
    assert!(satchel.save("party-draft", &value));

    // Spilled to the volatile tier; only the marker is on disk
    assert_eq!(
        satchel.persistent().get("party-draft-fallback"),
        Some("session".to_string())
    );
    assert_eq!(satchel.load("party-draft"), Some(value));
}
