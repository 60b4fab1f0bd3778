//! Error types for bootstrap, process runs, stubs and configuration.
//!
//! Each phase has its own error so callers can tell a failed download from a
//! failed `app_update` from functionality that simply does not exist yet.
//! [`Error`] unifies them for callers that propagate with `?`.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Exit status SteamCMD reports when the account has no license for the app.
///
/// Exposed for callers; the orchestrator itself does not interpret exit codes.
pub const EXIT_NO_SUBSCRIPTION: i32 = 8;

/// Failure while making the SteamCMD distribution available on disk.
///
/// Always safe to retry: the next `ensure_installed` call re-checks state.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Could not create steamcmd directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("Refusing to download steamcmd from {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("SteamCMD download from {url} failed: {source}")]
    Download { url: String, source: reqwest::Error },

    #[error("SteamCMD download from {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to extract steamcmd archive into {path}: {source}")]
    Extract { path: PathBuf, source: io::Error },

    #[error("SteamCMD entry point {0} missing or not executable after bootstrap")]
    EntryPointMissing(PathBuf),

    #[error("Bootstrap task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Failure of a single SteamCMD invocation.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to start {program}: {source}")]
    Spawn { program: PathBuf, source: io::Error },

    #[error("Failed to wait for steamcmd: {0}")]
    Wait(#[source] io::Error),

    #[error("steamcmd exited with status {code}")]
    ExitStatus { code: i32 },

    #[error("steamcmd was terminated without an exit code ({status})")]
    Terminated { status: String },

    #[error("steamcmd did not finish within {0:?}")]
    TimedOut(Duration),
}

impl RunError {
    /// Returns the raw exit code if the process exited on its own.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExitStatus { code } => Some(*code),
            _ => None,
        }
    }
}

/// Returned by operations that exist in the API but are not implemented yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{operation} is not implemented")]
pub struct NotImplementedError {
    /// Name of the unimplemented operation.
    pub operation: &'static str,
}

impl NotImplementedError {
    pub(crate) const fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

/// Errors raised while loading configuration or preparing directories.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Invalid config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Could not create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// Any error produced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    NotImplemented(#[from] NotImplementedError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// True when the failure signals missing functionality rather than a fault.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self, Self::NotImplemented(_))
    }
}
