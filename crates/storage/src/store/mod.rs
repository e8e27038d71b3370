#![forbid(unsafe_code)]

mod branch;
mod error;
mod memory;
mod sqlite;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::{DB_FILE, SqliteStore};

use weft_core::model::{Message, Settings, Thread};

/// Generator for fresh record ids. Injectable so tests can force id
/// collisions partway through a branch apply; production backends default
/// to UUIDv4.
pub type IdSource = Box<dyn Fn() -> String + Send + Sync>;

pub(crate) fn uuid_source() -> IdSource {
    Box::new(|| uuid::Uuid::new_v4().to_string())
}

pub(crate) fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// The contract every backend satisfies identically in observable behavior.
///
/// Absence on single-record lookups is `Ok(None)`, never an error; callers
/// must be able to tell "no such record" apart from an operational fault.
/// Mutating operations either apply wholly or leave state untouched —
/// `move_subtree` in particular is atomic with respect to every other
/// operation on the same thread.
pub trait Storage: Send + Sync {
    fn create_thread(&self, thread: &Thread) -> Result<(), StoreError>;
    fn get_thread(&self, id: &str) -> Result<Option<Thread>, StoreError>;
    fn list_threads(&self) -> Result<Vec<Thread>, StoreError>;
    /// Updates the title only; other fields keep their stored values.
    fn update_thread(&self, thread: &Thread) -> Result<(), StoreError>;
    /// Deletes the thread and every message whose `thread_id` names it.
    fn delete_thread(&self, id: &str) -> Result<(), StoreError>;

    fn create_message(&self, message: &Message) -> Result<(), StoreError>;
    fn get_message(&self, id: &str) -> Result<Option<Message>, StoreError>;
    /// Messages of one thread, ordered by `(timestamp, id)` ascending.
    fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError>;
    fn delete_message(&self, id: &str) -> Result<(), StoreError>;

    /// The branch operation: copies the ancestor chain of `message_id` and
    /// moves the message plus its descendant subtree into a fresh thread,
    /// returning the destination thread id. Fails with
    /// [`StoreError::MessageNotFound`] (leaving all state untouched) when
    /// the message does not exist.
    fn move_subtree(&self, message_id: &str) -> Result<String, StoreError>;

    /// Returns the settings singleton, inserting the default record on
    /// first read.
    fn get_settings(&self) -> Result<Settings, StoreError>;
    /// Upserts the settings singleton; the stored id is always forced to
    /// the singleton id regardless of the input.
    fn update_settings(&self, settings: &Settings) -> Result<(), StoreError>;
}
