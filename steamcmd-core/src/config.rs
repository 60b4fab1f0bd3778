//! Orchestrator configuration.
//!
//! Settings can be loaded from a JSON file, overridden from the environment,
//! or built in code. Every field has a default so an empty `{}` is valid.
//!
//! | Variable                     | Field              |
//! |------------------------------|--------------------|
//! | `STEAMCMD_DIR`               | `steamcmd_dir`     |
//! | `STEAMCMD_INSTALL_ROOT`      | `install_root`     |
//! | `STEAMCMD_USERNAME`          | `credentials`      |
//! | `STEAMCMD_PASSWORD`          | `credentials`      |
//! | `STEAMCMD_DEBUG`             | `debug`            |
//! | `STEAMCMD_BOOTSTRAP_URL`     | `bootstrap_url`    |
//! | `STEAMCMD_RUN_TIMEOUT_SECS`  | `run_timeout_secs` |

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bootstrap::DEFAULT_BOOTSTRAP_URL;
use crate::error::ConfigError;

// =============================================================================
// Credentials
// =============================================================================

/// Steam account used for `+login`. Without one, the anonymous account is used.
///
/// SteamCMD only takes the password on its command line, so while an install
/// runs it is visible to other local users through the process list (`ps`).
/// It is redacted from this crate's logs and `Debug` output only. Prefer the
/// anonymous account, or a dedicated Steam account, on shared hosts.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Orchestrator Settings
// =============================================================================

/// Settings for a [`crate::SteamCmd`] instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteamCmdConfig {
    /// Where SteamCMD lives. A fresh temp dir is created when unset.
    pub steamcmd_dir: Option<PathBuf>,

    /// Base directory for installed apps. A fresh temp dir is created when unset.
    pub install_root: Option<PathBuf>,

    /// Login identity; anonymous when unset.
    pub credentials: Option<Credentials>,

    /// Forward steamcmd stdout/stderr to this process's console.
    pub debug: bool,

    /// Archive the bootstrap downloads SteamCMD from.
    pub bootstrap_url: String,

    /// Kill steamcmd if a single invocation runs longer than this.
    pub run_timeout_secs: Option<u64>,
}

impl Default for SteamCmdConfig {
    fn default() -> Self {
        Self {
            steamcmd_dir: None,
            install_root: None,
            credentials: None,
            debug: false,
            bootstrap_url: DEFAULT_BOOTSTRAP_URL.to_string(),
            run_timeout_secs: None,
        }
    }
}

impl SteamCmdConfig {
    /// Loads settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Loaded steamcmd config from {}", path.display());
        Ok(config)
    }

    /// Default settings with overrides from the process environment.
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `STEAMCMD_*` overrides using `lookup` to read variables.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = lookup("STEAMCMD_DIR") {
            self.steamcmd_dir = Some(PathBuf::from(dir));
        }
        if let Some(dir) = lookup("STEAMCMD_INSTALL_ROOT") {
            self.install_root = Some(PathBuf::from(dir));
        }
        if let Some(username) = lookup("STEAMCMD_USERNAME") {
            let password = lookup("STEAMCMD_PASSWORD").unwrap_or_default();
            self.credentials = Some(Credentials::new(username, password));
        }
        if let Some(flag) = lookup("STEAMCMD_DEBUG") {
            self.debug = matches!(
                flag.trim().to_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(url) = lookup("STEAMCMD_BOOTSTRAP_URL") {
            self.bootstrap_url = url;
        }
        if let Some(secs) = lookup("STEAMCMD_RUN_TIMEOUT_SECS") {
            match secs.trim().parse::<u64>() {
                Ok(secs) => self.run_timeout_secs = Some(secs),
                Err(_) => warn!("Ignoring invalid STEAMCMD_RUN_TIMEOUT_SECS: {}", secs),
            }
        }

        self
    }

    /// The per-invocation timeout, if any.
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}
