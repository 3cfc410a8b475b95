//! Configuration loading and types

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vzutil_exec::Target;

/// Top-level configuration, usually `vzutil.toml`
///
/// ```toml
/// log_level = "debug"
///
/// [targets.web]
/// kind = "remote_container"
/// ctid = 101
/// remote = { host = "node1.example.com", options = ["-o", "BatchMode=yes"] }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error), overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Capture transport output without streaming it
    #[serde(default)]
    pub quiet: bool,
    /// Named targets
    #[serde(default)]
    pub targets: BTreeMap<String, Target>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            quiet: false,
            targets: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &Path) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| eyre::eyre!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Load from default paths or use defaults
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("VZUTIL_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let paths = [
            Some(PathBuf::from("vzutil.toml")),
            Some(PathBuf::from("/etc/vzutil/vzutil.toml")),
            dirs::config_dir().map(|p| p.join("vzutil/vzutil.toml")),
        ];

        for path in paths.into_iter().flatten() {
            if path.exists() {
                return Self::load(&path);
            }
        }

        Ok(Config::default())
    }

    /// Look up a named target
    pub fn target(&self, name: &str) -> eyre::Result<&Target> {
        self.targets.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.targets.keys().map(String::as_str).collect();
            eyre::eyre!("unknown target {name:?} (configured: {})", known.join(", "))
        })
    }
}
