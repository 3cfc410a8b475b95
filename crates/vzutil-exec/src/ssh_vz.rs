//! Container on a remote host
//!
//! No transport of its own: every call is rewritten (script wrapped for
//! `vzctl exec2`, paths moved under the container root) and handed to the
//! remote runner it owns.

use async_trait::async_trait;
use tracing::instrument;

use crate::error::ExecError;
use crate::result::{CommandResult, Verbosity};
use crate::ssh::SshRunner;
use crate::templates::{self, DEFAULT_TAG, DEFAULT_VZCTL, ENV_SUFFIX, VZ_SUFFIX};
use crate::traits::Runner;
use crate::vz::{DEFAULT_VZ_ROOT, ensure_tags_free, vz_path};

/// Runner for container `ctid` on the host reached by an inner runner
pub struct SshVzRunner {
    remote: Box<dyn Runner>,
    ctid: u32,
    vzctl: String,
    root: String,
}

impl std::fmt::Debug for SshVzRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshVzRunner")
            .field("remote", &self.remote.describe_command())
            .field("ctid", &self.ctid)
            .field("vzctl", &self.vzctl)
            .field("root", &self.root)
            .finish()
    }
}

impl SshVzRunner {
    /// Reach container `ctid` through an SSH runner
    #[must_use]
    pub fn new(ssh: SshRunner, ctid: u32) -> Self {
        Self::with_remote(Box::new(ssh), ctid)
    }

    /// Reach container `ctid` through any runner for the hosting machine
    #[must_use]
    pub fn with_remote(remote: Box<dyn Runner>, ctid: u32) -> Self {
        Self {
            remote,
            ctid,
            vzctl: DEFAULT_VZCTL.to_string(),
            root: DEFAULT_VZ_ROOT.to_string(),
        }
    }

    /// Use a different container root mount on the remote host
    #[must_use]
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Use a different exec tool on the remote host
    #[must_use]
    pub fn with_vzctl(mut self, vzctl: impl Into<String>) -> Self {
        self.vzctl = vzctl.into();
        self
    }

    pub fn ctid(&self) -> u32 {
        self.ctid
    }

    /// Remote-host path for a path inside the container
    #[must_use]
    pub fn vz_dir(&self, path: &str) -> String {
        vz_path(&self.root, self.ctid, path)
    }

    fn script(&self, commands: &str) -> Result<String, ExecError> {
        let vz_tag = templates::derive_tag(DEFAULT_TAG, VZ_SUFFIX);
        let env_tag = templates::derive_tag(DEFAULT_TAG, ENV_SUFFIX);
        ensure_tags_free(commands, &[vz_tag.as_str(), env_tag.as_str()])?;
        Ok(templates::wrap_in_vz_with(
            &self.vzctl,
            commands,
            self.ctid,
            DEFAULT_TAG,
        ))
    }
}

#[async_trait]
impl Runner for SshVzRunner {
    #[instrument(skip(self, commands), fields(ctid = self.ctid), level = "debug")]
    async fn run(
        &self,
        commands: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        let script = self.script(commands)?;
        self.remote.run(&script, verbosity).await
    }

    #[instrument(skip(self), fields(ctid = self.ctid), level = "debug")]
    async fn copy_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.remote
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
        self.remote.copy_to(src, &self.vz_dir(dest), verbosity).await
    }

    #[instrument(skip(self), fields(ctid = self.ctid), level = "debug")]
    async fn sync_from(
        &self,
        src: &str,
        dest: &str,
        verbosity: Verbosity,
    ) -> Result<CommandResult, ExecError> {
        self.remote
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
        self.remote.sync_to(src, &self.vz_dir(dest), verbosity).await
    }

    fn describe_command(&self) -> String {
        format!(
            "{} {} enter {}",
            self.remote.describe_command(),
            shell_words::quote(&self.vzctl),
            self.ctid
        )
    }

    fn runner_type(&self) -> &'static str {
        "ssh_vz"
    }
}
