//! Owns the child process of one execution.

use std::future::Future;
use std::os::unix::process::ExitStatusExt;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use crate::error::{ExecError, ExitReason};
use crate::launcher::Invocation;
use crate::output::{spawn_pipe_reader, OutputSource};

pub type WaitFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ExecError>> + Send + 'a>>;

/// Start, wait for and kill one child process.
///
/// Implementations differ in how the output is captured. All of them spawn in
/// the working directory of the server and inherit its environment.
pub trait ProcessSupervisor: Send {
    /// Spawns the child and starts reading its output. Does not block.
    ///
    /// # Errors
    /// [`ExecError::Spawn`] if the process cannot be started,
    /// [`ExecError::Capture`] if its output cannot be captured.
    fn start(&mut self) -> Result<OutputSource, ExecError>;

    /// Resolves once the child has exited and was reaped.
    ///
    /// Cancel safe, dropping the future and calling `wait` again continues waiting.
    ///
    /// # Errors
    /// [`ExecError::Exit`] unless the exit code is zero.
    fn wait(&mut self) -> WaitFuture<'_>;

    /// Kills the child and everything it started. Idempotent, does nothing once
    /// the child was reaped.
    fn kill(&mut self);
}

/// Captures stdout and stderr through two pipes. stdin is `/dev/null`.
///
/// The child leads a new process group, so shell pipelines and background jobs
/// are killed along with it.
#[derive(Debug)]
pub struct PipeSupervisor {
    invocation: Invocation,
    child: Option<Child>,
}

impl PipeSupervisor {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            child: None,
        }
    }
}

impl ProcessSupervisor for PipeSupervisor {
    fn start(&mut self) -> Result<OutputSource, ExecError> {
        if self.child.is_some() {
            return Err(ExecError::Spawn(String::from("process already started")));
        }
        let Invocation { program, args } = &self.invocation;

        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| ExecError::spawn(program, e))?;
        log::debug!(pid:debug = child.id(); "spawned {program:?}");

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(ExecError::capture("capturing output", "pipes were not created"));
        };
        self.child = Some(child);
        Ok(spawn_pipe_reader(stdout, stderr))
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move {
            let Some(child) = self.child.as_mut() else {
                return Err(ExecError::Spawn(String::from("process was never started")));
            };
            let status = child
                .wait()
                .await
                .map_err(|e| ExecError::capture("waiting for process", e))?;
            exit_result(status)
        })
    }

    fn kill(&mut self) {
        // No id once the child was reaped, its pid may belong to someone else by then.
        if let Some(pid) = self.child.as_ref().and_then(Child::id) {
            kill_group(pid);
        }
    }
}

impl Drop for PipeSupervisor {
    fn drop(&mut self) {
        // `kill_on_drop` only reaches the leader.
        self.kill();
    }
}

/// Sends `SIGKILL` to the process group led by `pid`.
pub fn kill_group(pid: u32) {
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    match killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => log::debug!(pid; "killed process group"),
        Err(Errno::ESRCH) => log::trace!(pid; "process group already gone"),
        Err(e) => log::warn!(pid, e:display; "failed to kill process group"),
    }
}

/// Maps a wait status to the result reported to the client.
pub fn exit_result(status: ExitStatus) -> Result<(), ExecError> {
    if status.success() {
        return Ok(());
    }
    let reason = match (status.code(), status.signal()) {
        (Some(code), _) => ExitReason::Code(code),
        (None, Some(signal)) => ExitReason::Signal(
            Signal::try_from(signal).map_or_else(|_| signal.to_string(), |s| s.to_string()),
        ),
        (None, None) => ExitReason::Code(-1),
    };
    Err(ExecError::Exit(reason))
}
