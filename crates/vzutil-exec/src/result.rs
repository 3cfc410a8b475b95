//! Result types for command execution

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Result of a successful transport invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Command line that was executed
    pub command: String,
    /// Exit status code (always 0 when returned from a runner)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Whether transport output is streamed while it is captured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Tee stdout and stderr to our own stderr as they arrive
    #[default]
    Verbose,
    /// Capture only
    Quiet,
}

impl Verbosity {
    #[must_use]
    pub fn is_verbose(self) -> bool {
        self == Verbosity::Verbose
    }
}

impl From<bool> for Verbosity {
    fn from(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Quiet
        }
    }
}
