//! SteamCMD Core Library
//!
//! This crate bootstraps and drives [SteamCMD](https://developer.valvesoftware.com/wiki/SteamCMD)
//! so that dedicated server apps are present and up to date on local disk
//! before they are launched. It includes:
//!
//! - Configuration with JSON file and environment overrides
//! - Bootstrap of the SteamCMD distribution (streaming tar.gz download)
//! - A serialized process runner for the `+command` argument protocol
//! - The [`SteamCmd`] orchestrator (install/update by app id)
//! - A static catalog of known dedicated servers
//!
//! # Example
//!
//! ```ignore
//! use steamcmd_core::{AppId, SteamCmd, SteamCmdConfig};
//!
//! let steam = SteamCmd::new(SteamCmdConfig::from_env())?;
//! steam.set_debug_streaming(true);
//! steam.ensure_installed().await?;
//!
//! let dst = AppId::new(343050).unwrap();
//! steam.install_or_update_app(dst).await?;
//! println!("installed to {}", steam.get_app_path(dst).display());
//! ```

pub mod bootstrap;
pub mod catalog;
pub mod command;
pub mod config;
pub mod error;
pub mod paths;
pub mod runner;
pub mod steamcmd;
pub mod types;

// Re-exports for convenience
pub use bootstrap::{ArchiveFetcher, HttpTarballFetcher, DEFAULT_BOOTSTRAP_URL};
pub use catalog::{all_servers, find_by_app_id, find_by_slug, resolve, ServerDefinition};
pub use command::SteamCommand;
pub use config::{Credentials, SteamCmdConfig};
pub use error::{
    BootstrapError, ConfigError, Error, NotImplementedError, RunError, EXIT_NO_SUBSCRIPTION,
};
pub use runner::{CommandRunner, Invocation, ProcessRunner};
pub use steamcmd::SteamCmd;
pub use types::{AppId, BuildId, WorkshopItemId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
