#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use weft_core::model::{Message, Settings, Thread};

use crate::support::now_unix;

/// Wire records. Inputs may omit ids and clocks; the server backfills a
/// fresh UUID and the current time, as the HTTP layer this replaces did.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct ThreadDto {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) created_at: i64,
}

impl ThreadDto {
    pub(crate) fn from_record(record: Thread) -> Self {
        Self {
            id: record.id,
            title: record.title,
            created_at: record.created_at,
        }
    }

    pub(crate) fn into_record(self) -> Thread {
        Thread {
            id: backfill_id(self.id),
            title: self.title,
            created_at: backfill_clock(self.created_at),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct MessageDto {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) thread_id: String,
    #[serde(default)]
    pub(crate) parent_id: Option<String>,
    #[serde(default)]
    pub(crate) root_id: Option<String>,
    pub(crate) role: String,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) timestamp: i64,
}

impl MessageDto {
    pub(crate) fn from_record(record: Message) -> Self {
        Self {
            id: record.id,
            thread_id: record.thread_id,
            parent_id: record.parent_id,
            root_id: record.root_id,
            role: record.role,
            content: record.content,
            timestamp: record.timestamp,
        }
    }

    pub(crate) fn into_record(self) -> Message {
        Message {
            id: backfill_id(self.id),
            thread_id: self.thread_id,
            parent_id: self.parent_id,
            root_id: self.root_id,
            role: self.role,
            content: self.content,
            timestamp: backfill_clock(self.timestamp),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct SettingsDto {
    #[serde(default)]
    pub(crate) id: String,
    pub(crate) provider: String,
    pub(crate) endpoint: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub(crate) api_key: String,
    pub(crate) model: String,
    pub(crate) simulate_only: bool,
}

impl SettingsDto {
    /// Read-side conversion: the api key is never echoed back.
    pub(crate) fn from_record_redacted(record: Settings) -> Self {
        Self {
            id: record.id,
            provider: record.provider,
            endpoint: record.endpoint,
            api_key: String::new(),
            model: record.model,
            simulate_only: record.simulate_only,
        }
    }

    pub(crate) fn into_record(self) -> Settings {
        Settings {
            id: self.id,
            provider: self.provider,
            endpoint: self.endpoint,
            api_key: self.api_key,
            model: self.model,
            simulate_only: self.simulate_only,
        }
    }
}

fn backfill_id(id: String) -> String {
    if id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        id
    }
}

fn backfill_clock(value: i64) -> i64 {
    if value == 0 { now_unix() } else { value }
}
