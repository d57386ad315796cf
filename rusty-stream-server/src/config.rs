use crate::launcher::{ExecLauncher, Invocation, Launcher, ShellLauncher};
use crate::pty::PtySupervisor;
use crate::supervisor::{PipeSupervisor, ProcessSupervisor};

/// Everything a request handler needs to know, fixed at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub command: CommandSpec,
    pub mode: ExecutionMode,
    pub capture: CaptureMode,
    /// Whether `?arg=` query parameters are appended to the command line.
    pub permit_arguments: bool,
}

/// The command line given on startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// The configured command line followed by `extra`.
    pub fn argv_with(&self, extra: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.argv.len() + extra.len());
        argv.extend_from_slice(&self.argv);
        argv.extend_from_slice(extra);
        argv
    }
}

/// How the command line is handed to the operating system.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Joined with spaces and run by `sh -c`.
    #[default]
    Shell,
    /// The first token is the executable, the rest are its arguments.
    Exec,
}

impl ExecutionMode {
    pub fn launcher(self) -> &'static dyn Launcher {
        match self {
            ExecutionMode::Shell => &ShellLauncher,
            ExecutionMode::Exec => &ExecLauncher,
        }
    }
}

/// How the output of the command is captured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaptureMode {
    /// Separate stdout and stderr pipes.
    #[default]
    Pipe,
    /// A pseudo terminal, the command sees a tty.
    Pty,
}

impl CaptureMode {
    pub fn supervisor(self, invocation: Invocation) -> Box<dyn ProcessSupervisor> {
        match self {
            CaptureMode::Pipe => Box::new(PipeSupervisor::new(invocation)),
            CaptureMode::Pty => Box::new(PtySupervisor::new(invocation)),
        }
    }
}
