#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use rusqlite::Connection;
use weft_core::model::{Message, Thread};
use weft_storage::{DB_FILE, SqliteStore, Storage, StoreError};

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

fn seed_chain(store: &dyn Storage) {
    store
        .create_thread(&Thread {
            id: "t1".to_string(),
            title: "Original".to_string(),
            created_at: 1_700_000_000,
        })
        .expect("create thread");
    for (id, parent, ts) in [("m1", None, 10), ("m2", Some("m1"), 20), ("m3", Some("m2"), 30)] {
        store
            .create_message(&Message {
                id: id.to_string(),
                thread_id: "t1".to_string(),
                parent_id: parent.map(str::to_string),
                root_id: parent.map(|_| "m1".to_string()),
                role: "user".to_string(),
                content: id.to_uppercase(),
                timestamp: ts,
            })
            .expect("create message");
    }
}

#[test]
fn failed_copy_rolls_back_the_whole_branch() {
    let dir = temp_dir("rollback");

    // Branching from m2 draws four fresh ids: copies of m1, m2, m3, then
    // the destination thread. Handing out "m1" for the second copy
    // collides with the surviving ancestor row partway through the apply.
    let calls = AtomicUsize::new(0);
    let store = SqliteStore::open(&dir)
        .expect("open store")
        .with_id_source(Box::new(move || {
            match calls.fetch_add(1, Ordering::SeqCst) {
                1 => "m1".to_string(),
                n => format!("fresh-{n}"),
            }
        }));

    seed_chain(&store);

    let err = store.move_subtree("m2").expect_err("expected mid-copy failure");
    match err {
        StoreError::Sql(_) => {}
        other => panic!("expected a sqlite constraint fault, got {other:?}"),
    }

    // The original thread is byte-for-byte intact and no destination
    // thread became visible.
    let threads = store.list_threads().expect("list threads");
    assert_eq!(threads.len(), 1);
    assert_eq!(threads[0].id, "t1");

    let messages = store.list_messages("t1").expect("list messages");
    let ids: Vec<&str> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
    assert_eq!(messages[1].parent_id.as_deref(), Some("m1"));
    assert_eq!(messages[2].content, "M3");

    let conn = Connection::open(dir.join(DB_FILE)).expect("open raw connection");
    let total: i64 = conn
        .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
        .expect("count messages");
    assert_eq!(total, 3, "no copies may survive the rollback");
}

#[test]
fn uncommitted_branch_writes_are_not_persisted_after_reopen() {
    let dir = temp_dir("uncommitted");
    {
        let store = SqliteStore::open(&dir).expect("open store");
        seed_chain(&store);
    }

    // Simulate a crash between the destination writes and the commit.
    {
        let mut conn = Connection::open(dir.join(DB_FILE)).expect("open raw connection");
        let tx = conn.transaction().expect("begin");
        tx.execute(
            "INSERT INTO threads (id, title, created_at) VALUES ('t-half', 'Branched: M2', 0)",
            [],
        )
        .expect("insert half thread");
        tx.execute(
            "INSERT INTO messages (id, thread_id, parent_id, root_id, role, content, timestamp)
             VALUES ('half-copy', 't-half', NULL, 'half-copy', 'user', 'M1', 10)",
            [],
        )
        .expect("insert half copy");
        // Dropped without commit.
    }

    let store = SqliteStore::open(&dir).expect("reopen store");
    assert!(store.get_thread("t-half").expect("get half thread").is_none());
    assert_eq!(store.list_threads().expect("list threads").len(), 1);
    let ids: Vec<String> = store
        .list_messages("t1")
        .expect("list messages")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(ids, vec!["m1".to_string(), "m2".to_string(), "m3".to_string()]);
}

#[test]
fn concurrent_readers_never_observe_a_half_applied_branch() {
    let dir = temp_dir("isolation");
    let store = std::sync::Arc::new(SqliteStore::open(&dir).expect("open store"));
    seed_chain(store.as_ref());

    let reader = {
        let store = std::sync::Arc::clone(&store);
        std::thread::spawn(move || {
            // A snapshot of t1 is legal exactly when it is the pre-branch
            // set {m1,m2,m3} or the post-branch remainder {m1}.
            for _ in 0..200 {
                let ids: Vec<String> = store
                    .list_messages("t1")
                    .expect("list messages")
                    .into_iter()
                    .map(|m| m.id)
                    .collect();
                assert!(
                    ids == ["m1", "m2", "m3"] || ids == ["m1"],
                    "observed a half-applied branch: {ids:?}"
                );
            }
        })
    };

    store.move_subtree("m2").expect("move subtree");
    reader.join().expect("reader thread");

    let remaining: Vec<String> = store
        .list_messages("t1")
        .expect("list messages")
        .into_iter()
        .map(|m| m.id)
        .collect();
    assert_eq!(remaining, vec!["m1".to_string()]);

    let moved: i64 = Connection::open(dir.join(DB_FILE))
        .expect("open raw connection")
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE thread_id != 't1'",
            [],
            |row| row.get(0),
        )
        .expect("count moved");
    assert_eq!(moved, 3);
}
