//! Container execution on the local host via `vzctl`

use async_trait::async_trait;
use tracing::instrument;

use crate::error::ExecError;
use crate::local::LocalRunner;
use crate::process::Invocation;
use crate::result::{CommandResult, Verbosity};
use crate::templates::{self, DEFAULT_TAG, DEFAULT_VZCTL};
use crate::traits::Runner;

/// Where container root filesystems are mounted on the host
pub const DEFAULT_VZ_ROOT: &str = "/vz/root";

/// Host-side path of `path` inside container `ctid`
///
/// `vz_path("/vz/root", 101, "/etc/hosts")` is `/vz/root/101/etc/hosts`.
#[must_use]
pub fn vz_path(root: &str, ctid: u32, path: &str) -> String {
    format!(
        "{}/{ctid}/{}",
        root.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Refuse commands that contain one of the terminators about to be emitted
pub(crate) fn ensure_tags_free(commands: &str, tags: &[&str]) -> Result<(), ExecError> {
    match templates::check_tag(commands, tags) {
        Some(tag) => Err(ExecError::InvalidArgument(format!(
            "commands contain heredoc terminator line `{tag}`"
        ))),
        None => Ok(()),
    }
}

/// Runner for a container on this host
///
/// `run` goes through `vzctl exec2 <ctid> bash` with the script wrapped in a
/// login shell, since exec2 sessions start with a thin environment. Copies and
/// syncs are local operations on the container's root filesystem.
#[derive(Debug, Clone)]
pub struct VzRunner {
    ctid: u32,
    vzctl: String,
    root: String,
    local: LocalRunner,
}

impl VzRunner {
    /// Create a runner for container `ctid`
    #[must_use]
    pub fn new(ctid: u32) -> Self {
        Self {
            ctid,
            vzctl: DEFAULT_VZCTL.to_string(),
            root: DEFAULT_VZ_ROOT.to_string(),
            local: LocalRunner::new(),
        }
    }

    /// Use a different container root mount
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Use a different exec tool
    #[must_use]
    pub fn with_vzctl(mut self, vzctl: impl Into<String>) -> Self {
        self.vzctl = vzctl.into();
        self
    }

    pub fn ctid(&self) -> u32 {
        self.ctid
    }

    /// Host-side path for a path inside this container
    #[must_use]
    pub fn vz_dir(&self, path: &str) -> String {
        vz_path(&self.root, self.ctid, path)
    }

    fn exec_invocation(&self) -> Invocation {
        Invocation::new(&self.vzctl)
            .arg("exec2")
            .arg(self.ctid.to_string())
            .arg("bash")
    }

    fn script(commands: &str) -> Result<String, ExecError> {
        ensure_tags_free(commands, &[DEFAULT_TAG])?;
        Ok(templates::wrap_in_env(commands, DEFAULT_TAG))
    }
}

#[async_trait]
impl Runner for VzRunner {
    #[instrument(skip(self, commands), fields(ctid = self.ctid), level = "debug")]
    async fn run(
        &self,
        commands: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        let script = Self::script(commands)?;
        self.exec_invocation()
            .execute(Some(&script), verbosity)
            .await
    }

    #[instrument(skip(self), fields(ctid = self.ctid), level = "debug")]
    async fn copy_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.local
            .copy_from(&self.vz_dir(src), dest, verbosity)
            .await
    }

    #[instrument(skip(self), fields(ctid = self.ctid), level = "debug")]
    async fn copy_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.local.copy_to(src, &self.vz_dir(dest), verbosity).await
    }

    #[instrument(skip(self), fields(ctid = self.ctid), level = "debug")]
    async fn sync_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.local
            .sync_from(&self.vz_dir(src), dest, verbosity)
            .await
    }

    #[instrument(skip(self), fields(ctid = self.ctid), level = "debug")]
    async fn sync_to(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.local.sync_to(src, &self.vz_dir(dest), verbosity).await
    }

    fn describe_command(&self) -> String {
        format!("{} enter {}", shell_words::quote(&self.vzctl), self.ctid)
    }

    fn runner_type(&self) -> &'static str {
        "vz"
    }
}
