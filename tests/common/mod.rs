//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use wireguard_loop::config::DaemonConfig;

/// Config rooted in `runtime_dir` with nothing inherited.
pub fn config_in(runtime_dir: &Path) -> DaemonConfig {
    DaemonConfig {
        runtime_dir: runtime_dir.to_path_buf(),
        ..DaemonConfig::default()
    }
}

/// Send one UAPI request and collect the response lines up to the blank line.
pub async fn uapi_request(client: &mut BufReader<UnixStream>, request: &str) -> Vec<String> {
    client.get_mut().write_all(request.as_bytes()).await.unwrap();
    let mut lines = Vec::new();
    loop {
        let mut line = String::new();
        let read = client.read_line(&mut line).await.unwrap();
        let line = line.trim_end();
        if read == 0 || line.is_empty() {
            return lines;
        }
        lines.push(line.to_string());
    }
}

/// Connect to a control socket, retrying while the server is starting.
pub async fn connect(path: &Path) -> BufReader<UnixStream> {
    for _ in 0..100 {
        if let Ok(stream) = UnixStream::connect(path).await {
            return BufReader::new(stream);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("could not connect to {}", path.display());
}
