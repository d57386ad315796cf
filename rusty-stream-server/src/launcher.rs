//! Turns a command line into the program and arguments that are actually spawned.

use crate::error::ExecError;

/// The program to spawn and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

pub trait Launcher: Send + Sync {
    /// # Errors
    /// If no program can be derived from `argv`.
    fn invocation(&self, argv: Vec<String>) -> Result<Invocation, ExecError>;
}

/// Runs the command line through `sh -c`.
///
/// The tokens are joined with single spaces, so quoting and expansion is up to the shell.
#[derive(Debug, Clone, Copy)]
pub struct ShellLauncher;

impl Launcher for ShellLauncher {
    fn invocation(&self, argv: Vec<String>) -> Result<Invocation, ExecError> {
        Ok(Invocation {
            program: String::from("sh"),
            args: vec![String::from("-c"), argv.join(" ")],
        })
    }
}

/// Executes the first token directly.
#[derive(Debug, Clone, Copy)]
pub struct ExecLauncher;

impl Launcher for ExecLauncher {
    fn invocation(&self, argv: Vec<String>) -> Result<Invocation, ExecError> {
        let mut argv = argv.into_iter();
        match argv.next() {
            Some(program) if !program.is_empty() => Ok(Invocation {
                program,
                args: argv.collect(),
            }),
            _ => Err(ExecError::Spawn(String::from("empty command"))),
        }
    }
}
