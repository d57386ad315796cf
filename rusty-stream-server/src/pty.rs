//! Runs the child on a pseudo terminal, for commands that behave differently
//! when their output is not a tty.

use std::io;

use portable_pty::{native_pty_system, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::task::JoinHandle;

use crate::error::{ExecError, ExitReason};
use crate::launcher::Invocation;
use crate::output::{spawn_pty_reader, OutputSource};
use crate::supervisor::{kill_group, ProcessSupervisor, WaitFuture};

/// Captures the combined output through the master side of a pty.
///
/// stdin, stdout and stderr of the child are the slave side, so the output is
/// interleaved exactly like a terminal would show it, including `\r\n` line endings.
/// The child leads its own session, killing it kills that session's process group.
pub struct PtySupervisor {
    invocation: Invocation,
    size: PtySize,
    state: PtyState,
}

enum PtyState {
    Idle,
    Running(Running),
    Reaped(Result<(), ExecError>),
}

struct Running {
    pid: Option<u32>,
    /// Hangs up the child when its pid is unknown.
    killer: Box<dyn ChildKiller + Send + Sync>,
    /// `portable_pty` only offers a blocking wait.
    waiter: JoinHandle<io::Result<portable_pty::ExitStatus>>,
    /// Keeps the pty open while the child runs.
    _master: Box<dyn MasterPty + Send>,
}

impl PtySupervisor {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            size: PtySize::default(),
            state: PtyState::Idle,
        }
    }
}

impl ProcessSupervisor for PtySupervisor {
    fn start(&mut self) -> Result<OutputSource, ExecError> {
        if !matches!(self.state, PtyState::Idle) {
            return Err(ExecError::Spawn(String::from("process already started")));
        }
        let Invocation { program, args } = &self.invocation;

        let pair = native_pty_system()
            .openpty(self.size)
            .map_err(|e| ExecError::capture("allocating pty", e))?;

        let mut command = CommandBuilder::new(program);
        command.args(args);
        if let Ok(cwd) = std::env::current_dir() {
            command.cwd(cwd);
        }

        let mut child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| ExecError::spawn(program, e))?;
        // Only the child may hold the slave, otherwise the master never hangs up.
        drop(pair.slave);
        log::debug!(pid:debug = child.process_id(); "spawned {program:?} on a pty");

        let pid = child.process_id();
        let killer = child.clone_killer();
        let waiter = tokio::task::spawn_blocking(move || child.wait());
        let reader = pair.master.try_clone_reader();
        self.state = PtyState::Running(Running {
            pid,
            killer,
            waiter,
            _master: pair.master,
        });

        let reader = match reader {
            Ok(reader) => reader,
            Err(e) => {
                self.kill();
                return Err(ExecError::capture("reading pty", e));
            }
        };
        spawn_pty_reader(reader).map_err(|e| {
            self.kill();
            ExecError::capture("starting pty reader", e)
        })
    }

    fn wait(&mut self) -> WaitFuture<'_> {
        Box::pin(async move {
            let running = match &mut self.state {
                PtyState::Idle => {
                    return Err(ExecError::Spawn(String::from("process was never started")))
                }
                PtyState::Reaped(result) => return result.clone(),
                PtyState::Running(running) => running,
            };
            let result = match (&mut running.waiter).await {
                Ok(Ok(status)) => exit_result(&status),
                Ok(Err(e)) => Err(ExecError::capture("waiting for process", e)),
                Err(e) => Err(ExecError::capture("waiting for process", e)),
            };
            self.state = PtyState::Reaped(result.clone());
            result
        })
    }

    fn kill(&mut self) {
        let PtyState::Running(running) = &mut self.state else {
            return;
        };
        // A finished waiter has reaped the child, its pid may be reused already.
        if running.waiter.is_finished() {
            return;
        }
        match running.pid {
            Some(pid) => kill_group(pid),
            None => {
                if let Err(e) = running.killer.kill() {
                    log::trace!(e:display; "kill skipped");
                }
            }
        }
    }
}

impl Drop for PtySupervisor {
    fn drop(&mut self) {
        // The waiter thread still reaps the child.
        self.kill();
    }
}

fn exit_result(status: &portable_pty::ExitStatus) -> Result<(), ExecError> {
    if status.success() {
        return Ok(());
    }
    let reason = match status.signal() {
        Some(signal) => ExitReason::Signal(signal.to_string()),
        None => ExitReason::Code(i32::try_from(status.exit_code()).unwrap_or(-1)),
    };
    Err(ExecError::Exit(reason))
}
