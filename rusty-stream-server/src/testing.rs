//! Fakes for exercising the streaming pipeline without processes or sockets.

use std::time::Duration;

use bytes::Bytes;

use crate::error::{ExecError, ExitReason};
use crate::multiplexer::{ResponseSink, SinkClosed};
use crate::output::OutputSource;
use crate::supervisor::{ProcessSupervisor, WaitFuture};

/// Records everything written to it.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub bytes: Vec<u8>,
    pub writes: usize,
    pub flushes: usize,
    pub closed: bool,
}

impl MemorySink {
    /// A sink whose client is already gone.
    pub fn closed() -> Self {
        Self {
            closed: true,
            ..Self::default()
        }
    }

    /// The bytes without heartbeats.
    pub fn output(&self) -> Vec<u8> {
        rusty_stream_api::strip_heartbeats(&self.bytes)
    }
}

impl ResponseSink for MemorySink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        if self.closed {
            return Err(SinkClosed);
        }
        self.writes += 1;
        self.bytes.extend_from_slice(&chunk);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkClosed> {
        self.flushes += 1;
        Ok(())
    }
}

/// Pretends to own a process, its exit is decided up front.
#[derive(Debug)]
pub struct ScriptedSupervisor {
    exit: Result<(), ExecError>,
    /// Delay before `wait` resolves.
    pub exit_after: Option<Duration>,
    /// `wait` never resolves unless killed.
    hang: bool,
    pub killed: bool,
    pub waited: bool,
}

impl ScriptedSupervisor {
    pub fn exiting(exit: Result<(), ExecError>) -> Self {
        Self {
            exit,
            exit_after: None,
            hang: false,
            killed: false,
            waited: false,
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::exiting(Ok(()))
        }
    }
}

impl ProcessSupervisor for ScriptedSupervisor {
    fn start(&mut self) -> Result<OutputSource, ExecError> {
        Err(ExecError::Spawn(String::from("scripted supervisors are never started")))
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move {
            if !self.killed {
                if self.hang {
                    std::future::pending::<()>().await;
                }
                if let Some(delay) = self.exit_after {
                    tokio::time::sleep(delay).await;
                }
            }
            self.waited = true;
            if self.killed {
                Err(ExecError::Exit(ExitReason::Signal(String::from("SIGKILL"))))
            } else {
                self.exit.clone()
            }
        })
    }

    fn kill(&mut self) {
        self.killed = true;
    }
}

/// Reads until the first line break and returns the line without it.
pub async fn read_line(source: &mut OutputSource) -> String {
    let mut bytes = Vec::new();
    while !bytes.contains(&b'\n') {
        match source.next_chunk().await {
            Some(chunk) => bytes.extend_from_slice(&chunk),
            None => break,
        }
    }
    let text = String::from_utf8_lossy(&bytes);
    text.lines().next().unwrap_or_default().trim().to_string()
}

/// Whether `pid` is dead. Zombies count as dead, whoever inherited them reaps them.
#[cfg(target_os = "linux")]
pub fn is_gone(pid: i32) -> bool {
    let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return true;
    };
    // The state follows the parenthesised command name.
    stat.rsplit(')')
        .next()
        .is_some_and(|rest| rest.trim_start().starts_with('Z'))
}

/// Polls [`is_gone`] for up to five seconds.
#[cfg(target_os = "linux")]
pub async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..100 {
        if is_gone(pid) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
