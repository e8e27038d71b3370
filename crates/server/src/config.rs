#![forbid(unsafe_code)]

use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum StorageKind {
    Memory,
    Sqlite,
}

#[derive(Debug)]
pub(crate) enum ConfigError {
    UnknownStorageKind(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownStorageKind(value) => {
                write!(f, "unsupported storage type: {value} (expected memory|sqlite)")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Process configuration, read from the environment:
/// `WEFT_STORAGE` (memory|sqlite, default memory), `WEFT_DATA_DIR`,
/// `WEFT_AUTH_FILE` (credential file; auth is off when unset),
/// `WEFT_LOG_FILE` (session log; off when unset).
#[derive(Debug)]
pub(crate) struct Config {
    pub(crate) storage: StorageKind,
    pub(crate) data_dir: PathBuf,
    pub(crate) auth_file: Option<PathBuf>,
    pub(crate) log_file: Option<PathBuf>,
}

impl Config {
    pub(crate) fn from_env() -> Result<Self, ConfigError> {
        let storage = match std::env::var("WEFT_STORAGE") {
            Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
                "" | "memory" => StorageKind::Memory,
                "sqlite" => StorageKind::Sqlite,
                _ => return Err(ConfigError::UnknownStorageKind(value)),
            },
            Err(_) => StorageKind::Memory,
        };
        let data_dir = std::env::var("WEFT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let auth_file = std::env::var("WEFT_AUTH_FILE").ok().map(PathBuf::from);
        let log_file = std::env::var("WEFT_LOG_FILE").ok().map(PathBuf::from);
        Ok(Self {
            storage,
            data_dir,
            auth_file,
            log_file,
        })
    }
}
