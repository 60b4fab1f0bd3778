//! Path layout for the SteamCMD tool directory and the app install root.
//!
//! - `{tool_dir}/steamcmd.sh`: the entry point every invocation runs
//! - `{tool_dir}/.bootstrap-staging/`: scratch space while unpacking
//! - `{install_root}/{app_id}/`: one directory per installed app
//!
//! When no directory is configured, a fresh one is created under the OS temp
//! folder (`/tmp/steamcmd-<uuid>` on Linux). Removing it is up to the caller.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::ConfigError;
use crate::types::AppId;

/// File name of the SteamCMD launcher script.
pub const ENTRY_POINT: &str = "steamcmd.sh";

/// Directory (inside the tool dir) an archive is unpacked into before promotion.
pub const STAGING_DIR: &str = ".bootstrap-staging";

// ============================================================================
// Path Resolution
// ============================================================================

/// Returns the path of the SteamCMD launcher inside `tool_dir`.
pub fn entry_point(tool_dir: &Path) -> PathBuf {
    tool_dir.join(ENTRY_POINT)
}

/// Returns the staging directory used while bootstrapping `tool_dir`.
pub fn staging_dir(tool_dir: &Path) -> PathBuf {
    tool_dir.join(STAGING_DIR)
}

/// Returns where an app is installed: `{install_root}/{id}`.
pub fn app_dir(install_root: &Path, id: AppId) -> PathBuf {
    install_root.join(id.to_string())
}

/// Creates a uniquely named directory under the OS temp folder.
///
/// Path: `{temp}/{prefix}-{uuid}/`
pub fn create_temp_dir(prefix: &str) -> Result<PathBuf, ConfigError> {
    let dir = std::env::temp_dir().join(format!("{}-{}", prefix, Uuid::new_v4()));
    std::fs::create_dir_all(&dir).map_err(|source| ConfigError::CreateDir {
        path: dir.clone(),
        source,
    })?;
    Ok(dir)
}
