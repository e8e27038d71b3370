#![forbid(unsafe_code)]

use std::path::PathBuf;

use weft_core::model::{Message, SETTINGS_ID, Settings, Thread};
use weft_storage::{MemoryStore, SqliteStore, Storage, StoreError};

fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("weft_storage_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

fn thread(id: &str, title: &str) -> Thread {
    Thread {
        id: id.to_string(),
        title: title.to_string(),
        created_at: 1_700_000_000,
    }
}

fn message(id: &str, thread_id: &str, parent: Option<&str>, content: &str, ts: i64) -> Message {
    Message {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        parent_id: parent.map(str::to_string),
        root_id: None,
        role: "user".to_string(),
        content: content.to_string(),
        timestamp: ts,
    }
}

fn run_crud_suite(store: &dyn Storage) {
    store.create_thread(&thread("t1", "Test Thread")).expect("create thread");

    let loaded = store.get_thread("t1").expect("get thread").expect("thread exists");
    assert_eq!(loaded.title, "Test Thread");
    assert!(store.get_thread("absent").expect("get absent").is_none());

    assert_eq!(store.list_threads().expect("list threads").len(), 1);

    store
        .create_thread(&thread("t1", "Duplicate"))
        .expect_err("duplicate thread id must be rejected");

    let mut renamed = loaded.clone();
    renamed.title = "Renamed".to_string();
    store.update_thread(&renamed).expect("update thread");
    let loaded = store.get_thread("t1").expect("get thread").expect("thread exists");
    assert_eq!(loaded.title, "Renamed");
    match store.update_thread(&thread("absent", "x")) {
        Err(StoreError::UnknownThread) => {}
        other => panic!("expected UnknownThread, got {other:?}"),
    }

    store
        .create_message(&message("m1", "t1", None, "hello", 10))
        .expect("create message");
    store
        .create_message(&message("m2", "t1", Some("m1"), "world", 20))
        .expect("create child");

    let got = store.get_message("m1").expect("get message").expect("message exists");
    assert_eq!(got.content, "hello");
    assert!(store.get_message("absent").expect("get absent").is_none());

    match store.create_message(&message("m3", "absent", None, "x", 0)) {
        Err(StoreError::UnknownThread) => {}
        other => panic!("expected UnknownThread, got {other:?}"),
    }
    match store.create_message(&message("m3", "t1", Some("absent"), "x", 0)) {
        Err(StoreError::InvalidInput(_)) => {}
        other => panic!("expected InvalidInput, got {other:?}"),
    }

    let listed = store.list_messages("t1").expect("list messages");
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, "m1");
    assert_eq!(listed[1].id, "m2");

    store.delete_message("m2").expect("delete message");
    assert_eq!(store.list_messages("t1").expect("list messages").len(), 1);

    store.delete_thread("t1").expect("delete thread");
    assert!(store.list_threads().expect("list threads").is_empty());
    assert!(
        store.get_message("m1").expect("get message").is_none(),
        "thread delete must cascade to messages"
    );
}

fn run_ordering_suite(store: &dyn Storage) {
    store.create_thread(&thread("t1", "Ordered")).expect("create thread");
    store
        .create_message(&message("b", "t1", None, "second", 200))
        .expect("create");
    store
        .create_message(&message("a", "t1", None, "first", 100))
        .expect("create");
    store
        .create_message(&message("c", "t1", None, "tied", 100))
        .expect("create");

    let ids: Vec<String> = store
        .list_messages("t1")
        .expect("list messages")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["a".to_string(), "c".to_string(), "b".to_string()]);
}

fn run_settings_suite(store: &dyn Storage) {
    let defaults = store.get_settings().expect("get settings");
    assert_eq!(defaults.id, SETTINGS_ID);
    assert_eq!(defaults.provider, "ollama");
    assert!(defaults.simulate_only);

    let update = Settings {
        id: "whatever".to_string(),
        provider: "openai".to_string(),
        endpoint: "https://api.openai.com".to_string(),
        api_key: "sk-secret".to_string(),
        model: "gpt-4o".to_string(),
        simulate_only: false,
    };
    store.update_settings(&update).expect("update settings");

    let stored = store.get_settings().expect("get settings");
    assert_eq!(stored.id, SETTINGS_ID, "settings id must be forced to the singleton");
    assert_eq!(stored.provider, "openai");
    assert_eq!(stored.api_key, "sk-secret");
    assert!(!stored.simulate_only);
}

#[test]
fn memory_backend_passes_the_crud_suite() {
    run_crud_suite(&MemoryStore::new());
}

#[test]
fn sqlite_backend_passes_the_crud_suite() {
    let dir = temp_dir("sqlite_crud");
    let store = SqliteStore::open(&dir).expect("open store");
    run_crud_suite(&store);
}

#[test]
fn memory_backend_orders_messages_by_timestamp_then_id() {
    run_ordering_suite(&MemoryStore::new());
}

#[test]
fn sqlite_backend_orders_messages_by_timestamp_then_id() {
    let dir = temp_dir("sqlite_ordering");
    let store = SqliteStore::open(&dir).expect("open store");
    run_ordering_suite(&store);
}

#[test]
fn memory_backend_keeps_a_settings_singleton() {
    run_settings_suite(&MemoryStore::new());
}

#[test]
fn sqlite_backend_keeps_a_settings_singleton() {
    let dir = temp_dir("sqlite_settings");
    let store = SqliteStore::open(&dir).expect("open store");
    run_settings_suite(&store);
}

#[test]
fn sqlite_backend_persists_across_reopen() {
    let dir = temp_dir("sqlite_reopen");
    {
        let store = SqliteStore::open(&dir).expect("open store");
        store.create_thread(&thread("t1", "Durable")).expect("create thread");
        store
            .create_message(&message("m1", "t1", None, "kept", 1))
            .expect("create message");
    }
    let store = SqliteStore::open(&dir).expect("reopen store");
    let loaded = store.get_thread("t1").expect("get thread").expect("thread survives");
    assert_eq!(loaded.title, "Durable");
    assert_eq!(store.list_messages("t1").expect("list messages").len(), 1);
}
