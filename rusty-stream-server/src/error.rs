use std::fmt;

use thiserror::Error;

/// Why a single execution failed.
///
/// The `Display` output is what the client sees at the end of the response body.
#[derive(Debug, Clone, Error)]
pub enum ExecError {
    /// The process could not be started.
    #[error("{0}")]
    Spawn(String),
    /// Output could not be captured, or the process could not be waited for.
    #[error("{0}")]
    Capture(String),
    /// The process ran and did not exit successfully.
    #[error("{0}")]
    Exit(ExitReason),
}

impl ExecError {
    pub fn spawn(program: &str, err: impl fmt::Display) -> Self {
        Self::Spawn(format!("failed to start {program:?}: {err}"))
    }

    pub fn capture(what: &str, err: impl fmt::Display) -> Self {
        Self::Capture(format!("{what}: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Code(i32),
    Signal(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Code(code) => write!(f, "exit status {code}"),
            ExitReason::Signal(signal) => write!(f, "terminated by signal {signal}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_messages() {
        assert_eq!(
            ExecError::Exit(ExitReason::Code(1)).to_string(),
            "exit status 1"
        );
        assert_eq!(
            ExecError::Exit(ExitReason::Signal(String::from("9"))).to_string(),
            "terminated by signal 9"
        );
    }

    #[test]
    fn spawn_message_names_program() {
        let err = ExecError::spawn("nope", "No such file or directory");
        assert_eq!(
            err.to_string(),
            "failed to start \"nope\": No such file or directory"
        );
    }
}
