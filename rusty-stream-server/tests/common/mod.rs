//! Starts the server binary and talks to it.

// Each test binary uses a different part of this module.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::USER_AGENT;
use tokio::process::{Child, Command};

/// A client header the server accepts.
pub const CURL: &str = "curl/8.5.0";

pub struct Server {
    pub child: Child,
    pub url: String,
}

/// Starts the server on a random local port and waits until it accepts requests.
pub async fn spawn_server(args: &[&str]) -> anyhow::Result<Server> {
    // IANA recommended port range.
    let port = fastrand::u16(49152..65535);
    let child = server_command(&format!("127.0.0.1:{port}"), args).spawn()?;
    let url = format!("http://127.0.0.1:{port}");

    // Unidentified requests never run the command, which makes them a cheap probe.
    for _ in 0..100 {
        if reqwest::get(&url).await.is_ok() {
            return Ok(Server { child, url });
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("server did not start listening on {url}")
}

pub fn server_command(addr: &str, args: &[&str]) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_rusty-stream-server"));
    command.kill_on_drop(true).args(["--addr", addr]).args(args);
    command
}

/// Raw response body of an identified request.
pub async fn fetch(server: &Server, path: &str) -> anyhow::Result<Vec<u8>> {
    let response = reqwest::Client::new()
        .get(format!("{}{path}", server.url))
        .header(USER_AGENT, CURL)
        .send()
        .await?;
    Ok(response.bytes().await?.to_vec())
}

/// Response body of an identified request without heartbeats.
pub async fn fetch_output(server: &Server, path: &str) -> anyhow::Result<String> {
    let body = fetch(server, path).await?;
    Ok(String::from_utf8(rusty_stream_api::strip_heartbeats(&body))?)
}

/// A path in the temporary directory that does not exist yet.
pub fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rusty-stream-{name}-{}", fastrand::u64(..)))
}

pub async fn wait_for(path: &Path) -> anyhow::Result<()> {
    for _ in 0..100 {
        if path.exists() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    anyhow::bail!("{} never appeared", path.display())
}

/// Polls until `pid` is dead. Zombies count as dead, their reaper is not ours.
#[cfg(target_os = "linux")]
pub async fn wait_until_gone(pid: &str, within: Duration) -> bool {
    let stat = PathBuf::from(format!("/proc/{pid}/stat"));
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        let Ok(stat) = std::fs::read_to_string(&stat) else {
            return true;
        };
        if stat
            .rsplit(')')
            .next()
            .is_some_and(|state| state.trim_start().starts_with('Z'))
        {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}
