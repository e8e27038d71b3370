#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug)]
pub(crate) enum AuthError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "credential file: {err}"),
            Self::Parse(err) => write!(f, "credential file: {err}"),
        }
    }
}

impl std::error::Error for AuthError {}

#[derive(Debug, Deserialize)]
struct CredentialEntry {
    username: String,
    /// SHA-256 hex digest of the password.
    password: String,
}

/// Credential check backed by a JSON file: an array of
/// `{"username": ..., "password": <sha256 hex>}` entries.
pub(crate) struct Credentials {
    users: HashMap<String, String>,
}

impl Credentials {
    pub(crate) fn load(path: &Path) -> Result<Self, AuthError> {
        let raw = std::fs::read_to_string(path).map_err(AuthError::Io)?;
        let entries: Vec<CredentialEntry> =
            serde_json::from_str(&raw).map_err(AuthError::Parse)?;
        let users = entries
            .into_iter()
            .map(|entry| (entry.username, entry.password.to_ascii_lowercase()))
            .collect();
        Ok(Self { users })
    }

    pub(crate) fn verify(&self, username: &str, password: &str) -> bool {
        match self.users.get(username) {
            Some(stored) => sha256_hex(password) == *stored,
            None => false,
        }
    }
}

fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}
