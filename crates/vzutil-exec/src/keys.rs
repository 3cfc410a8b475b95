//! SSH identity resolution
//!
//! The transports are the stock `ssh`/`scp`/`rsync` binaries, so a key ends up
//! as an `-i <path>` option. Keys handed over through the environment are
//! written to a private temp file that lives as long as the runner.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

/// SSH key resolution strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeySource {
    /// Explicit path to key file
    Path(PathBuf),
    /// Leave it to ssh-agent and `~/.ssh/config`
    Agent,
    /// Base64-encoded key from environment variable
    Env(String),
}

impl KeySource {
    /// Resolve key source to a path or agent
    ///
    /// For `Env`, decodes base64 and writes to temp file
    ///
    /// # Errors
    /// Returns `KeyError` if key resolution fails (env not set, invalid base64, etc.)
    pub fn resolve(&self) -> Result<ResolvedKey, KeyError> {
        match self {
            KeySource::Path(path) => {
                validate_key_permissions(path)?;
                Ok(ResolvedKey::Path(path.clone()))
            }
            KeySource::Agent => Ok(ResolvedKey::Agent),
            KeySource::Env(var_name) => {
                let base64_key =
                    env::var(var_name).map_err(|_| KeyError::EnvNotSet(var_name.clone()))?;
                let key_data = base64_decode(&base64_key).map_err(|_| KeyError::InvalidBase64)?;

                let file = write_temp_key(&key_data)?;
                Ok(ResolvedKey::Temp(file))
            }
        }
    }
}

/// Resolved key location
#[derive(Debug)]
pub enum ResolvedKey {
    /// Path to key file
    Path(PathBuf),
    /// No identity option
    Agent,
    /// Private temporary file, one per resolution, deleted on drop
    Temp(NamedTempFile),
}

impl ResolvedKey {
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedKey::Path(p) => Some(p.as_path()),
            ResolvedKey::Temp(file) => Some(file.path()),
            ResolvedKey::Agent => None,
        }
    }

    /// Transport options selecting this identity
    #[must_use]
    pub fn options(&self) -> Vec<String> {
        self.path()
            .map(|p| vec!["-i".to_string(), p.display().to_string()])
            .unwrap_or_default()
    }
}

/// Key resolution errors
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("environment variable {0} not set")]
    EnvNotSet(String),

    #[error("invalid base64 encoding")]
    InvalidBase64,

    #[error("key file permissions too open: {0} (should be 600)")]
    BadPermissions(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn base64_decode(input: &str) -> Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.decode(input.trim())
}

fn validate_key_permissions(path: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();

    // group/other bits must be clear, ssh refuses the key otherwise
    if mode & 0o77 != 0 {
        return Err(KeyError::BadPermissions(path.display().to_string()));
    }

    Ok(())
}

fn write_temp_key(key_data: &[u8]) -> Result<NamedTempFile, KeyError> {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    let mut file = tempfile::Builder::new()
        .prefix("vzutil_ssh_key_")
        .permissions(std::fs::Permissions::from_mode(0o600))
        .tempfile()?;
    file.write_all(key_data)?;
    file.flush()?;

    debug!(path = %file.path().display(), "wrote temporary SSH key");

    Ok(file)
}
