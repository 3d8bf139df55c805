//! Structured error types for remexec-core.
//!
//! Uses `thiserror` so library consumers can match on failures.
//! The `remexec` binary wraps these in `anyhow` at the call sites.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::runner::ExecOutput;

/// Main error type for remote execution
#[derive(Error, Debug)]
pub enum ExecError {
    /// No winexe/psexec/paexec/psexec.py could be located
    #[error("no remote execution backend found (install winexe, psexec.py, paexec or psexec)")]
    NoBackend,

    /// The backend executable could not be started
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Reading the child's pipes or waiting on it failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// The watchdog killed the child
    #[error("Timed out after {}ms. {}", .timeout.as_millis(), .output.stderr.trim())]
    TimedOut { timeout: Duration, output: ExecOutput },

    /// The child exited with a non-zero code or was terminated by a signal
    #[error("Exit code: {}. {}", display_code(.code), .output.stderr.trim())]
    ExitStatus {
        code: Option<i32>,
        output: ExecOutput,
    },

    /// Invalid host or option combination
    #[error("Invalid invocation: {reason}")]
    InvalidInvocation { reason: String },
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

/// Result type alias for remexec-core operations
pub type Result<T> = std::result::Result<T, ExecError>;

impl ExecError {
    /// Create a spawn error for the given program
    pub fn spawn(program: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }

    /// Create an invalid invocation error
    pub fn invalid_invocation(reason: impl Into<String>) -> Self {
        Self::InvalidInvocation {
            reason: reason.into(),
        }
    }

    /// Output collected before the failure, if the child ran at all
    pub fn output(&self) -> Option<&ExecOutput> {
        match self {
            Self::TimedOut { output, .. } | Self::ExitStatus { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Exit code to report for this failure, mirroring coreutils `timeout`
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::TimedOut { .. } => 124,
            Self::ExitStatus { code: Some(code), .. } => *code,
            Self::Spawn { .. } | Self::NoBackend => 127,
            _ => 1,
        }
    }
}

/// Errors raised while loading or resolving configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path:?} (invalid TOML): {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write config file {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("no host given and profile '{0}' does not exist")]
    UnknownProfile(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output_with_stderr(stderr: &str) -> ExecOutput {
        ExecOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: None,
        }
    }

    #[test]
    fn test_exit_status_display() {
        let err = ExecError::ExitStatus {
            code: Some(5),
            output: output_with_stderr("Access is denied.\n"),
        };
        assert_eq!(err.to_string(), "Exit code: 5. Access is denied.");
        assert_eq!(err.exit_code(), 5);

        let err = ExecError::ExitStatus {
            code: None,
            output: output_with_stderr(""),
        };
        assert_eq!(err.to_string(), "Exit code: signal. ");
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_timed_out_reports_124() {
        let err = ExecError::TimedOut {
            timeout: Duration::from_millis(1500),
            output: output_with_stderr(""),
        };
        assert!(err.to_string().starts_with("Timed out after 1500ms"));
        assert_eq!(err.exit_code(), 124);
        assert!(err.output().is_some());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed");
        let err: ExecError = io_err.into();

        assert!(matches!(err, ExecError::Io { .. }));
        assert!(err.output().is_none());
    }
}
