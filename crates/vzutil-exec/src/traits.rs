//! Runner trait

use std::process::ExitStatus;

use async_trait::async_trait;

use crate::error::ExecError;
use crate::process;
use crate::result::{CommandResult, Verbosity};

/// One target (local machine, container, remote host, remote container)
/// behind a uniform set of operations.
///
/// Every call spawns its own transport process and completes when that
/// process exits. Nothing is retried.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Run a command or a script of commands on the target
    async fn run(&self, commands: &str, verbosity: Verbosity)
    -> Result<CommandResult, ExecError>;

    /// Recursively copy `src` on the target to `dest` on the local machine
    async fn copy_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError>;

    /// Recursively copy `src` on the local machine to `dest` on the target
    async fn copy_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError>;

    /// Incrementally sync `src` on the target into `dest` locally
    async fn sync_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError>;

    /// Incrementally sync local `src` into `dest` on the target
    async fn sync_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError>;

    /// Shell command that opens an interactive session on the target
    fn describe_command(&self) -> String;

    /// Open an interactive shell attached to our terminal
    ///
    /// Runs exactly [`Runner::describe_command`]. A failing session is
    /// reported through its exit status, never as `CommandFailed`.
    async fn interactive(&self) -> Result<ExitStatus, ExecError> {
        process::interactive(&self.describe_command()).await
    }

    /// Short name used in logs
    fn runner_type(&self) -> &'static str;
}
