#![forbid(unsafe_code)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, params};
use weft_core::ids::validate_id;
use weft_core::model::{Message, SETTINGS_ID, Settings, Thread};

use super::branch::plan_branch;
use super::{IdSource, Storage, StoreError, now_unix, uuid_source};

pub const DB_FILE: &str = "weft.db";

/// Durable backend over SQLite. Every multi-step mutation runs inside one
/// transaction; a branch either commits wholly or rolls back to the exact
/// pre-operation state.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    id_source: IdSource,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref();
        std::fs::create_dir_all(storage_dir)?;

        let conn = Connection::open(storage_dir.join(DB_FILE))?;
        conn.busy_timeout(Duration::from_secs(5))?;
        install_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
            id_source: uuid_source(),
        })
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means some caller panicked mid-operation;
        // any transaction it held was rolled back on drop, so the
        // connection stays usable.
        self.conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    // parent_id carries no foreign key: parent links are validated on
    // insert, and deleting a message deliberately orphans its children
    // rather than failing or cascading.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        PRAGMA foreign_keys=ON;

        CREATE TABLE IF NOT EXISTS threads (
          id TEXT PRIMARY KEY,
          title TEXT NOT NULL,
          created_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
          id TEXT PRIMARY KEY,
          thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
          parent_id TEXT,
          root_id TEXT,
          role TEXT NOT NULL,
          content TEXT NOT NULL,
          timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(thread_id);
        CREATE INDEX IF NOT EXISTS idx_messages_parent ON messages(parent_id);

        CREATE TABLE IF NOT EXISTS settings (
          id TEXT PRIMARY KEY,
          provider TEXT NOT NULL,
          endpoint TEXT NOT NULL,
          api_key TEXT NOT NULL,
          model TEXT NOT NULL,
          simulate_only INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn read_message(row: &rusqlite::Row<'_>) -> Result<Message, rusqlite::Error> {
    Ok(Message {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        parent_id: row.get(2)?,
        root_id: row.get(3)?,
        role: row.get(4)?,
        content: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

fn thread_messages_tx(tx: &Transaction<'_>, thread_id: &str) -> Result<Vec<Message>, StoreError> {
    let mut stmt = tx.prepare(
        "SELECT id, thread_id, parent_id, root_id, role, content, timestamp
         FROM messages WHERE thread_id = ?1",
    )?;
    let rows = stmt.query_map(params![thread_id], read_message)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl Storage for SqliteStore {
    fn create_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        validate_id(&thread.id)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM threads WHERE id = ?1",
                params![thread.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::InvalidInput("thread id already exists"));
        }
        tx.execute(
            "INSERT INTO threads (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![thread.id, thread.title, thread.created_at],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_thread(&self, id: &str) -> Result<Option<Thread>, StoreError> {
        let thread = self
            .conn()
            .query_row(
                "SELECT id, title, created_at FROM threads WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Thread {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(thread)
    }

    fn list_threads(&self) -> Result<Vec<Thread>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id, title, created_at FROM threads")?;
        let rows = stmt.query_map([], |row| {
            Ok(Thread {
                id: row.get(0)?,
                title: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn update_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        let updated = self.conn().execute(
            "UPDATE threads SET title = ?1 WHERE id = ?2",
            params![thread.title, thread.id],
        )?;
        if updated == 0 {
            return Err(StoreError::UnknownThread);
        }
        Ok(())
    }

    fn delete_thread(&self, id: &str) -> Result<(), StoreError> {
        // thread_id cascades, so the thread's messages go with it.
        self.conn()
            .execute("DELETE FROM threads WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn create_message(&self, message: &Message) -> Result<(), StoreError> {
        validate_id(&message.id)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let duplicate: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM messages WHERE id = ?1",
                params![message.id],
                |row| row.get(0),
            )
            .optional()?;
        if duplicate.is_some() {
            return Err(StoreError::InvalidInput("message id already exists"));
        }
        let thread_exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM threads WHERE id = ?1",
                params![message.thread_id],
                |row| row.get(0),
            )
            .optional()?;
        if thread_exists.is_none() {
            return Err(StoreError::UnknownThread);
        }
        if let Some(parent_id) = message.parent_id.as_deref() {
            let parent_thread: Option<String> = tx
                .query_row(
                    "SELECT thread_id FROM messages WHERE id = ?1",
                    params![parent_id],
                    |row| row.get(0),
                )
                .optional()?;
            match parent_thread {
                Some(thread_id) if thread_id == message.thread_id => {}
                Some(_) => {
                    return Err(StoreError::InvalidInput(
                        "parent message belongs to a different thread",
                    ));
                }
                None => return Err(StoreError::InvalidInput("parent message not found")),
            }
        }

        tx.execute(
            "INSERT INTO messages (id, thread_id, parent_id, root_id, role, content, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                message.id,
                message.thread_id,
                message.parent_id,
                message.root_id,
                message.role,
                message.content,
                message.timestamp
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        let message = self
            .conn()
            .query_row(
                "SELECT id, thread_id, parent_id, root_id, role, content, timestamp
                 FROM messages WHERE id = ?1",
                params![id],
                read_message,
            )
            .optional()?;
        Ok(message)
    }

    fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, thread_id, parent_id, root_id, role, content, timestamp
             FROM messages WHERE thread_id = ?1 ORDER BY timestamp, id",
        )?;
        let rows = stmt.query_map(params![thread_id], read_message)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        self.conn()
            .execute("DELETE FROM messages WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn move_subtree(&self, message_id: &str) -> Result<String, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let thread_id: Option<String> = tx
            .query_row(
                "SELECT thread_id FROM messages WHERE id = ?1",
                params![message_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(thread_id) = thread_id else {
            return Err(StoreError::MessageNotFound);
        };
        let snapshot = thread_messages_tx(&tx, &thread_id)?;

        let plan = plan_branch(&snapshot, message_id, &*self.id_source, now_unix())?;

        tx.execute(
            "INSERT INTO threads (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![
                plan.new_thread.id,
                plan.new_thread.title,
                plan.new_thread.created_at
            ],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO messages (id, thread_id, parent_id, root_id, role, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for copy in &plan.copies {
                insert.execute(params![
                    copy.id,
                    copy.thread_id,
                    copy.parent_id,
                    copy.root_id,
                    copy.role,
                    copy.content,
                    copy.timestamp
                ])?;
            }
            let mut delete = tx.prepare("DELETE FROM messages WHERE id = ?1")?;
            for removed in &plan.removed {
                delete.execute(params![removed])?;
            }
        }
        tx.commit()?;
        Ok(plan.new_thread.id)
    }

    fn get_settings(&self) -> Result<Settings, StoreError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let stored = tx
            .query_row(
                "SELECT id, provider, endpoint, api_key, model, simulate_only
                 FROM settings WHERE id = ?1",
                params![SETTINGS_ID],
                |row| {
                    Ok(Settings {
                        id: row.get(0)?,
                        provider: row.get(1)?,
                        endpoint: row.get(2)?,
                        api_key: row.get(3)?,
                        model: row.get(4)?,
                        simulate_only: row.get(5)?,
                    })
                },
            )
            .optional()?;

        let settings = match stored {
            Some(settings) => settings,
            None => {
                let defaults = Settings::default();
                tx.execute(
                    "INSERT INTO settings (id, provider, endpoint, api_key, model, simulate_only)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        defaults.id,
                        defaults.provider,
                        defaults.endpoint,
                        defaults.api_key,
                        defaults.model,
                        defaults.simulate_only
                    ],
                )?;
                defaults
            }
        };
        tx.commit()?;
        Ok(settings)
    }

    fn update_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO settings (id, provider, endpoint, api_key, model, simulate_only)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
               provider=excluded.provider,
               endpoint=excluded.endpoint,
               api_key=excluded.api_key,
               model=excluded.model,
               simulate_only=excluded.simulate_only",
            params![
                SETTINGS_ID,
                settings.provider,
                settings.endpoint,
                settings.api_key,
                settings.model,
                settings.simulate_only
            ],
        )?;
        Ok(())
    }
}
