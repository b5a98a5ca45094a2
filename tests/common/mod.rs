//! Common test utilities and fixtures
//!
//! Every command runs inside a temporary HOME and working directory so no
//! user configuration or `.env` file leaks into the test.

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use assert_cmd::Command;
use tempfile::TempDir;

/// Environment overrides the binary reads
const OVERRIDES: &[&str] = &[
    "SUPREME_CHAT_CONFIG",
    "SUPREME_CHAT_BIND",
    "SUPREME_CHAT_MAX_CONNECTIONS",
    "SUPREME_CHAT_BASE_URL",
    "SUPREME_CHAT_MODEL",
    "SUPREME_CHAT_API_KEY_ENV",
    "SUPREME_CHAT_ENV_FILE",
    "SUPREME_CHAT_REQUEST_TIMEOUT_SECS",
    "SUPREME_CHAT_LOG_LEVEL",
    "SUPREME_CHAT_LOG_FILE",
    "SUPREME_CHAT_LOG_JSON",
    "GEMINI_API_KEY",
    "RUST_LOG",
];

/// Isolated directory acting as HOME and working directory
pub struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the sandbox and return its path
    pub fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    /// The binary with a clean environment rooted in the sandbox
    pub fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("supreme-chat").unwrap();
        cmd.current_dir(self.dir.path())
            .env("HOME", self.dir.path())
            .env("XDG_CONFIG_HOME", self.dir.path().join(".config"));
        for var in OVERRIDES {
            cmd.env_remove(var);
        }
        cmd
    }
}

/// Serve one canned HTTP response from a background thread.
///
/// Returns the base URL to configure and a handle yielding the raw request.
pub fn serve_once(content_type: &str, body: &str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    );

    let handle = std::thread::spawn(move || {
        let (mut socket, _) = listener.accept().unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }
        socket.write_all(response.as_bytes()).unwrap();
        String::from_utf8_lossy(&raw).into_owned()
    });

    (format!("http://{}/v1/", addr), handle)
}

/// Headers received and the advertised body length is in
fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(split) = text.find("\r\n\r\n") else {
        return false;
    };
    let length = text[..split]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= split + 4 + length
}

/// SSE body streaming `fragments` as text deltas
pub fn sse_text(fragments: &[&str]) -> String {
    let mut body = String::new();
    for fragment in fragments {
        let chunk = serde_json::json!({
            "choices": [{ "delta": { "content": fragment } }]
        });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}
