use std::io::Write;

use reqwest::header::USER_AGENT;
use rusty_stream_api::HEARTBEAT;

const URL: &str = "http://localhost:8080/?arg=hello";

/// Prints the output of a running server as it arrives.
#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let mut response = reqwest::Client::new()
        .get(URL)
        .header(USER_AGENT, "curl/quick_dev")
        .send()
        .await?;
    println!("=> status: {}", response.status());

    let mut stdout = std::io::stdout();
    let mut heartbeats = 0usize;
    while let Some(chunk) = response.chunk().await? {
        heartbeats += chunk.iter().filter(|b| **b == HEARTBEAT).count();
        stdout.write_all(&rusty_stream_api::strip_heartbeats(&chunk))?;
        stdout.flush()?;
    }
    println!("=> {heartbeats} heartbeats");

    Ok(())
}
