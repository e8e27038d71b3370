#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use weft_core::ids::validate_id;
use weft_core::model::{Message, SETTINGS_ID, Settings, Thread};

use super::branch::plan_branch;
use super::{IdSource, Storage, StoreError, now_unix, uuid_source};

/// Volatile backend over in-process maps, guarded by one coarse lock.
/// Readers run concurrently; every mutation, including the whole branch
/// operation (plan and apply), happens under the exclusive write guard, so
/// no caller ever observes a half-applied branch.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    id_source: IdSource,
}

#[derive(Default)]
struct Inner {
    threads: HashMap<String, Thread>,
    messages: HashMap<String, Message>,
    settings: Option<Settings>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            id_source: uuid_source(),
        }
    }

    pub fn with_id_source(mut self, id_source: IdSource) -> Self {
        self.id_source = id_source;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        // A poisoned lock only means some caller panicked mid-operation;
        // mutations are planned before they are applied, so the maps stay
        // usable.
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Storage for MemoryStore {
    fn create_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        validate_id(&thread.id)?;
        let mut inner = self.write();
        if inner.threads.contains_key(&thread.id) {
            return Err(StoreError::InvalidInput("thread id already exists"));
        }
        inner.threads.insert(thread.id.clone(), thread.clone());
        Ok(())
    }

    fn get_thread(&self, id: &str) -> Result<Option<Thread>, StoreError> {
        Ok(self.read().threads.get(id).cloned())
    }

    fn list_threads(&self) -> Result<Vec<Thread>, StoreError> {
        Ok(self.read().threads.values().cloned().collect())
    }

    fn update_thread(&self, thread: &Thread) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.threads.get_mut(&thread.id) {
            Some(stored) => {
                stored.title = thread.title.clone();
                Ok(())
            }
            None => Err(StoreError::UnknownThread),
        }
    }

    fn delete_thread(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        inner.threads.remove(id);
        inner.messages.retain(|_, message| message.thread_id != id);
        Ok(())
    }

    fn create_message(&self, message: &Message) -> Result<(), StoreError> {
        validate_id(&message.id)?;
        let mut inner = self.write();
        if inner.messages.contains_key(&message.id) {
            return Err(StoreError::InvalidInput("message id already exists"));
        }
        if !inner.threads.contains_key(&message.thread_id) {
            return Err(StoreError::UnknownThread);
        }
        if let Some(parent_id) = message.parent_id.as_deref() {
            match inner.messages.get(parent_id) {
                Some(parent) if parent.thread_id == message.thread_id => {}
                Some(_) => {
                    return Err(StoreError::InvalidInput(
                        "parent message belongs to a different thread",
                    ));
                }
                None => return Err(StoreError::InvalidInput("parent message not found")),
            }
        }
        inner.messages.insert(message.id.clone(), message.clone());
        Ok(())
    }

    fn get_message(&self, id: &str) -> Result<Option<Message>, StoreError> {
        Ok(self.read().messages.get(id).cloned())
    }

    fn list_messages(&self, thread_id: &str) -> Result<Vec<Message>, StoreError> {
        let mut out: Vec<Message> = self
            .read()
            .messages
            .values()
            .filter(|message| message.thread_id == thread_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| (a.timestamp, &a.id).cmp(&(b.timestamp, &b.id)));
        Ok(out)
    }

    fn delete_message(&self, id: &str) -> Result<(), StoreError> {
        self.write().messages.remove(id);
        Ok(())
    }

    fn move_subtree(&self, message_id: &str) -> Result<String, StoreError> {
        let mut inner = self.write();
        let thread_id = match inner.messages.get(message_id) {
            Some(message) => message.thread_id.clone(),
            None => return Err(StoreError::MessageNotFound),
        };
        let snapshot: Vec<Message> = inner
            .messages
            .values()
            .filter(|message| message.thread_id == thread_id)
            .cloned()
            .collect();

        let plan = plan_branch(&snapshot, message_id, &*self.id_source, now_unix())?;

        inner
            .threads
            .insert(plan.new_thread.id.clone(), plan.new_thread.clone());
        for copy in plan.copies {
            inner.messages.insert(copy.id.clone(), copy);
        }
        for removed in &plan.removed {
            inner.messages.remove(removed);
        }
        Ok(plan.new_thread.id)
    }

    fn get_settings(&self) -> Result<Settings, StoreError> {
        let mut inner = self.write();
        Ok(inner
            .settings
            .get_or_insert_with(Settings::default)
            .clone())
    }

    fn update_settings(&self, settings: &Settings) -> Result<(), StoreError> {
        let mut stored = settings.clone();
        stored.id = SETTINGS_ID.to_string();
        self.write().settings = Some(stored);
        Ok(())
    }
}
