#![forbid(unsafe_code)]

use std::io::{BufRead as _, BufReader, Write as _};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use serde_json::{Value, json};

pub fn temp_dir(test_name: &str) -> PathBuf {
    let base = std::env::temp_dir();
    let pid = std::process::id();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = base.join(format!("weft_server_{test_name}_{pid}_{nonce}"));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

/// One spawned server process speaking line-delimited JSON-RPC on its
/// stdio, the way a supervising client would.
pub struct ServerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: i64,
}

impl ServerProcess {
    pub fn spawn(envs: &[(&str, String)]) -> Self {
        let mut command = Command::new(env!("CARGO_BIN_EXE_weft-server"));
        command.stdin(Stdio::piped()).stdout(Stdio::piped());
        for key in ["WEFT_STORAGE", "WEFT_DATA_DIR", "WEFT_AUTH_FILE", "WEFT_LOG_FILE"] {
            command.env_remove(key);
        }
        for (key, value) in envs {
            command.env(key, value);
        }
        let mut child = command.spawn().expect("spawn weft-server");
        let stdin = child.stdin.take().expect("child stdin");
        let stdout = BufReader::new(child.stdout.take().expect("child stdout"));
        Self {
            child,
            stdin,
            stdout,
            next_id: 1,
        }
    }

    pub fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        let request = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        let mut line = serde_json::to_string(&request).expect("encode request");
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .expect("write request");
        self.stdin.flush().expect("flush request");

        let mut response = String::new();
        self.stdout.read_line(&mut response).expect("read response");
        serde_json::from_str(&response).expect("decode response")
    }

    pub fn result(&mut self, method: &str, params: Value) -> Value {
        let response = self.request(method, params);
        assert!(
            response.get("error").is_none(),
            "unexpected error from {method}: {response}"
        );
        response.get("result").cloned().expect("result")
    }

    pub fn error_code(&mut self, method: &str, params: Value) -> i64 {
        let response = self.request(method, params);
        response
            .get("error")
            .and_then(|err| err.get("code"))
            .and_then(Value::as_i64)
            .unwrap_or_else(|| panic!("expected an error from {method}: {response}"))
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
