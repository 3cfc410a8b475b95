//! Target descriptors and runner construction

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ExecError;
use crate::keys::KeySource;
use crate::local::LocalRunner;
use crate::ssh::{DEFAULT_PORT, DEFAULT_USER, SshRunner};
use crate::ssh_vz::SshVzRunner;
use crate::traits::Runner;
use crate::vz::VzRunner;

/// Connection details for a remote host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteHost {
    /// Hostname or IP
    pub host: String,
    /// SSH user (defaults to root)
    #[serde(default = "default_user")]
    pub user: String,
    /// SSH port (defaults to 22)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Extra flags for every transport, e.g. `["-o", "StrictHostKeyChecking=no"]`
    #[serde(default)]
    pub options: Vec<String>,
    /// Identity to use; falls back to ssh-agent
    #[serde(default)]
    pub ssh_key: Option<KeySource>,
}

fn default_user() -> String {
    DEFAULT_USER.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl RemoteHost {
    /// Create connection details with default user and port
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: default_user(),
            port: DEFAULT_PORT,
            options: Vec::new(),
            ssh_key: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Build the SSH runner for this host
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if the identity cannot be resolved
    pub fn runner(&self) -> Result<SshRunner, ExecError> {
        SshRunner::builder(&self.host)
            .with_user(&self.user)
            .with_port(self.port)
            .with_options(self.options.iter().cloned())
            .with_key_source(self.ssh_key.clone().unwrap_or(KeySource::Agent))
            .build()
    }
}

/// Where commands execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// This machine
    Local,
    /// A container on this machine
    Container {
        ctid: u32,
        /// Container root mount, defaults to `/vz/root`
        #[serde(default)]
        root: Option<String>,
    },
    /// A remote host
    Remote(RemoteHost),
    /// A container on a remote host
    RemoteContainer {
        remote: RemoteHost,
        ctid: u32,
        #[serde(default)]
        root: Option<String>,
    },
}

impl Target {
    /// Construct the runner for this target
    ///
    /// # Errors
    /// Returns `ExecError::SshKeyError` if a remote identity cannot be resolved
    pub fn runner(&self) -> Result<Box<dyn Runner>, ExecError> {
        let runner: Box<dyn Runner> = match self {
            Target::Local => Box::new(LocalRunner::new()),
            Target::Container { ctid, root } => {
                let mut runner = VzRunner::new(*ctid);
                if let Some(root) = root {
                    runner = runner.with_root(root);
                }
                Box::new(runner)
            }
            Target::Remote(remote) => Box::new(remote.runner()?),
            Target::RemoteContainer { remote, ctid, root } => {
                let mut runner = SshVzRunner::new(remote.runner()?, *ctid);
                if let Some(root) = root {
                    runner = runner.with_root(root);
                }
                Box::new(runner)
            }
        };

        debug!(runner = runner.runner_type(), "created runner");
        Ok(runner)
    }
}
