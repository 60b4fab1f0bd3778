//! The SteamCMD orchestrator.
//!
//! [`SteamCmd`] is the main entry point. It owns one tool directory and one
//! install root, bootstraps SteamCMD on demand and installs apps by id.
//! SteamCMD keeps a single-writer cache in its own directory, so every
//! bootstrap and every invocation against an instance runs under one lock.
//! Share an instance across tasks with `Arc`; use separate instances (with
//! separate directories) for parallel work.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::bootstrap::{self, ArchiveFetcher, HttpTarballFetcher};
use crate::command::{build_args, SteamCommand};
use crate::config::{Credentials, SteamCmdConfig};
use crate::error::{BootstrapError, ConfigError, NotImplementedError, RunError};
use crate::paths;
use crate::runner::{CommandRunner, Invocation, ProcessRunner};
use crate::types::{AppId, BuildId, WorkshopItemId};

/// Drives a SteamCMD installation.
///
/// Waiters on the internal lock are served in the order they arrived.
/// Dropping an in-flight call kills its steamcmd process group, including any
/// client the launcher forked, before the lock is released.
pub struct SteamCmd {
    /// Where steamcmd.sh and its state live.
    tool_dir: PathBuf,
    /// Parent of every `{app_id}` install directory.
    install_root: PathBuf,
    credentials: Option<Credentials>,
    bootstrap_url: String,
    run_timeout: Option<Duration>,
    debug_streaming: AtomicBool,
    /// Serializes everything that touches `tool_dir`.
    lock: Mutex<()>,
    fetcher: Arc<dyn ArchiveFetcher>,
    runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SteamCmd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SteamCmd")
            .field("tool_dir", &self.tool_dir)
            .field("install_root", &self.install_root)
            .field("credentials", &self.credentials)
            .field("bootstrap_url", &self.bootstrap_url)
            .field("run_timeout", &self.run_timeout)
            .field("debug_streaming", &self.debug_streaming())
            .finish_non_exhaustive()
    }
}

impl SteamCmd {
    /// Creates an orchestrator that downloads over HTTPS and runs real processes.
    ///
    /// Unset directories are created fresh under the OS temp folder.
    pub fn new(config: SteamCmdConfig) -> Result<Self, ConfigError> {
        Self::with_collaborators(
            config,
            Arc::new(HttpTarballFetcher::default()),
            Arc::new(ProcessRunner),
        )
    }

    /// Creates an orchestrator with a custom fetch pipeline and process runner.
    pub fn with_collaborators(
        config: SteamCmdConfig,
        fetcher: Arc<dyn ArchiveFetcher>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ConfigError> {
        let run_timeout = config.run_timeout();

        let tool_dir = match config.steamcmd_dir {
            Some(dir) => dir,
            None => paths::create_temp_dir("steamcmd")?,
        };
        let install_root = match config.install_root {
            Some(dir) => dir,
            None => paths::create_temp_dir("games")?,
        };

        info!(
            "SteamCmd initialized. Tool dir: {}, install root: {}",
            tool_dir.display(),
            install_root.display()
        );

        Ok(Self {
            tool_dir,
            install_root,
            credentials: config.credentials,
            bootstrap_url: config.bootstrap_url,
            run_timeout,
            debug_streaming: AtomicBool::new(config.debug),
            lock: Mutex::new(()),
            fetcher,
            runner,
        })
    }

    /// Returns the SteamCMD tool directory.
    pub fn tool_dir(&self) -> &Path {
        &self.tool_dir
    }

    /// Returns the base directory apps are installed under.
    pub fn install_root(&self) -> &Path {
        &self.install_root
    }

    /// Returns the path of `steamcmd.sh`.
    pub fn entry_point(&self) -> PathBuf {
        paths::entry_point(&self.tool_dir)
    }

    /// Whether steamcmd output is forwarded to this process's console.
    pub fn debug_streaming(&self) -> bool {
        self.debug_streaming.load(Ordering::Relaxed)
    }

    /// Turns forwarding of steamcmd output on or off for later invocations.
    pub fn set_debug_streaming(&self, enabled: bool) {
        self.debug_streaming.store(enabled, Ordering::Relaxed);
    }

    // ========================================================================
    // Bootstrap
    // ========================================================================

    /// Downloads SteamCMD unless an executable `steamcmd.sh` is already present.
    ///
    /// Safe to call repeatedly; after a failure, calling it again retries.
    pub async fn ensure_installed(&self) -> Result<(), BootstrapError> {
        let _guard = self.lock.lock().await;
        bootstrap::ensure_installed(&self.tool_dir, &self.bootstrap_url, self.fetcher.as_ref())
            .await
    }

    // ========================================================================
    // Apps
    // ========================================================================

    /// Returns where an app is (or would be) installed. Performs no I/O.
    pub fn get_app_path(&self, id: AppId) -> PathBuf {
        paths::app_dir(&self.install_root, id)
    }

    /// Installs an app, or updates and validates an existing install.
    ///
    /// A failed call may leave partial files behind; calling again lets
    /// steamcmd's validation pass reconcile them.
    pub async fn install_or_update_app(&self, id: AppId) -> Result<(), RunError> {
        let app_path = self.get_app_path(id);
        info!("Installing app {} into {}", id, app_path.display());

        self.run(&[
            SteamCommand::login(self.credentials.as_ref()),
            SteamCommand::ForceInstallDir(app_path),
            SteamCommand::AppUpdate {
                app_id: id,
                validate: true,
            },
        ])
        .await
    }

    /// Returns the build id of the installed copy of an app.
    pub async fn app_installed_version(&self, id: AppId) -> Result<BuildId, NotImplementedError> {
        debug!(app_id = %id, "Installed version lookup requested");
        Err(NotImplementedError::new("app_installed_version"))
    }

    /// Returns the latest build id on the public branch of an app.
    pub async fn app_available_version(&self, id: AppId) -> Result<BuildId, NotImplementedError> {
        debug!(app_id = %id, "Available version lookup requested");
        Err(NotImplementedError::new("app_available_version"))
    }

    /// Downloads a workshop item for an app.
    pub async fn download_workshop_mod(
        &self,
        app_id: AppId,
        mod_id: WorkshopItemId,
    ) -> Result<(), NotImplementedError> {
        debug!(app_id = %app_id, mod_id = %mod_id, "Workshop download requested");
        Err(NotImplementedError::new("download_workshop_mod"))
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    /// Runs a command script through steamcmd while holding the lock.
    async fn run(&self, commands: &[SteamCommand]) -> Result<(), RunError> {
        let _guard = self.lock.lock().await;

        let invocation = Invocation {
            program: self.entry_point(),
            args: build_args(commands),
            working_dir: self.tool_dir.clone(),
            stream_output: self.debug_streaming(),
            timeout: self.run_timeout,
        };

        self.runner.execute(&invocation).await
    }
}
