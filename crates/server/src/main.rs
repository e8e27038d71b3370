#![forbid(unsafe_code)]

mod auth;
mod config;
mod dto;
mod server;
mod support;

use std::io::{BufRead as _, Write as _};

use weft_storage::{MemoryStore, SqliteStore, Storage};

use crate::auth::Credentials;
use crate::config::{Config, StorageKind};
use crate::server::Server;
use crate::support::{JsonRpcRequest, PARSE_ERROR, SessionLog, json_rpc_error};

fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("weft-server: {err}");
            std::process::exit(2);
        }
    };

    let store: Box<dyn Storage> = match config.storage {
        StorageKind::Memory => Box::new(MemoryStore::new()),
        StorageKind::Sqlite => match SqliteStore::open(&config.data_dir) {
            Ok(store) => Box::new(store),
            Err(err) => {
                eprintln!("weft-server: open storage: {err}");
                std::process::exit(2);
            }
        },
    };

    let credentials = match config.auth_file.as_deref() {
        Some(path) => match Credentials::load(path) {
            Ok(credentials) => Some(credentials),
            Err(err) => {
                eprintln!("weft-server: {err}");
                std::process::exit(2);
            }
        },
        None => None,
    };

    let mut server = Server::new(store, credentials, SessionLog::new(config.log_file.clone()));

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => server.handle(request),
            Err(_) => json_rpc_error(None, PARSE_ERROR, "parse error"),
        };
        let mut out = stdout.lock();
        if serde_json::to_writer(&mut out, &response).is_err() {
            break;
        }
        if out.write_all(b"\n").and_then(|()| out.flush()).is_err() {
            break;
        }
    }
}
