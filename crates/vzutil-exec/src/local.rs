//! Local command execution
//!
//! Silly on its own, but it gives the local machine the same API as the
//! container and remote targets.

use async_trait::async_trait;
use tracing::instrument;

use crate::error::ExecError;
use crate::process::Invocation;
use crate::result::{CommandResult, Verbosity};
use crate::traits::Runner;

const SHELL: &str = "bash";

/// Archive mode plus hard links
pub(crate) const RSYNC_FLAGS: &str = "-aH";

pub(crate) fn cp() -> Invocation {
    Invocation::new("cp").arg("-r")
}

pub(crate) fn rsync() -> Invocation {
    Invocation::new("rsync").arg(RSYNC_FLAGS)
}

/// Local runner
///
/// Scripts go to `bash` on stdin, copies use `cp -r`, syncs use `rsync -aH`.
#[derive(Debug, Clone, Default)]
pub struct LocalRunner;

impl LocalRunner {
    /// Create a new local runner
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Runner for LocalRunner {
    #[instrument(skip(self, commands), level = "debug")]
    async fn run(
        &self,
        commands: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        Invocation::new(SHELL)
            .execute(Some(commands), verbosity)
            .await
    }

    #[instrument(skip(self), level = "debug")]
    async fn copy_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        cp().args([src, dest]).execute(None, verbosity).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn copy_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        cp().args([src, dest]).execute(None, verbosity).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn sync_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        rsync().args([src, dest]).execute(None, verbosity).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn sync_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        rsync().args([src, dest]).execute(None, verbosity).await
    }

    fn describe_command(&self) -> String {
        SHELL.to_string()
    }

    fn runner_type(&self) -> &'static str {
        "local"
    }
}
