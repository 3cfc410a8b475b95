//! Error types for vzutil-exec

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keys::KeyError;

/// A transport ran and exited non-zero
///
/// Carries everything needed to diagnose the failure without re-running it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("`{command}` exited with status {status}: {}", .stderr.trim())]
pub struct RunnerError {
    /// Full command line that was attempted
    pub command: String,
    /// Script supplied on stdin (empty if none)
    pub stdin: String,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Exit status (-1 if terminated by a signal)
    pub status: i32,
}

/// Errors that can occur while driving a runner
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// The target command failed
    #[error(transparent)]
    CommandFailed(#[from] RunnerError),

    /// Transport binary could not be started
    #[error("failed to spawn `{program}`: {message}")]
    SpawnError {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        message: String,
    },

    /// Local I/O error while talking to the transport
    #[error("I/O error: {0}")]
    IoError(String),

    /// Caller passed something the runner refuses to act on
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// SSH identity could not be resolved
    #[error("SSH key error: {0}")]
    SshKeyError(String),
}

impl ExecError {
    /// Whether the failure happened on this side, before or around the transport
    ///
    /// Local faults point at configuration or environment problems; inspecting
    /// remote output will not help.
    #[must_use]
    pub fn is_local_fault(&self) -> bool {
        !matches!(self, ExecError::CommandFailed(_))
    }

    /// The remote failure details, if the target command ran and failed
    #[must_use]
    pub fn command_failure(&self) -> Option<&RunnerError> {
        match self {
            ExecError::CommandFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<KeyError> for ExecError {
    fn from(e: KeyError) -> Self {
        ExecError::SshKeyError(e.to_string())
    }
}
