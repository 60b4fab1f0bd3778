//! Known dedicated servers.
//!
//! Static definitions for the dedicated servers this crate is commonly used
//! to provision, so callers can refer to them by slug instead of app id.

use crate::types::AppId;

/// A dedicated server distributed through SteamCMD.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerDefinition {
    /// Human-readable name.
    pub name: &'static str,
    /// Short lowercase identifier, usable on the command line.
    pub slug: &'static str,
    pub app_id: AppId,
    /// Launcher relative to the install directory.
    pub executable: &'static str,
    /// Arguments the launcher needs to start this particular game.
    pub args: &'static [&'static str],
}

impl ServerDefinition {
    /// The launch command as it would be typed in the install directory.
    pub fn launch_command(&self) -> String {
        let mut command = self.executable.to_string();
        for arg in self.args {
            command.push(' ');
            command.push_str(arg);
        }
        command
    }
}

const fn app(id: u32) -> AppId {
    match AppId::new(id) {
        Some(id) => id,
        None => panic!("app id must be non-zero"),
    }
}

// ============================================================================
// Standalone Servers
// ============================================================================

const ARMA3: ServerDefinition = ServerDefinition {
    name: "Arma 3",
    slug: "arma3",
    app_id: app(233780),
    executable: "./arma3server",
    args: &[],
};

const RUST: ServerDefinition = ServerDefinition {
    name: "Rust",
    slug: "rust",
    app_id: app(258550),
    executable: "./RustDedicated",
    args: &[],
};

const DONT_STARVE_TOGETHER: ServerDefinition = ServerDefinition {
    name: "Don't Starve Together",
    slug: "dst",
    app_id: app(343050),
    executable: "./dontstarve_dedicated_server_nullrenderer",
    args: &[],
};

// ============================================================================
// Source Engine Servers (srcds)
// ============================================================================

const CSGO: ServerDefinition = ServerDefinition {
    name: "Counter-Strike: Global Offensive",
    slug: "csgo",
    app_id: app(740),
    executable: "./srcds_run",
    args: &["-game", "csgo"],
};

const TF2: ServerDefinition = ServerDefinition {
    name: "Team Fortress 2",
    slug: "tf2",
    app_id: app(232250),
    executable: "./srcds_run",
    args: &["-game", "tf"],
};

const GARRYS_MOD: ServerDefinition = ServerDefinition {
    name: "Garry's Mod",
    slug: "gmod",
    app_id: app(4020),
    executable: "./srcds_run",
    args: &["-game", "garrysmod"],
};

const CSS: ServerDefinition = ServerDefinition {
    name: "Counter-Strike: Source",
    slug: "css",
    app_id: app(232330),
    executable: "./srcds_run",
    args: &["-game", "cstrike"],
};

const L4D2: ServerDefinition = ServerDefinition {
    name: "Left 4 Dead 2",
    slug: "l4d2",
    app_id: app(222860),
    executable: "./srcds_run",
    args: &["-game", "left4dead2"],
};

const L4D: ServerDefinition = ServerDefinition {
    name: "Left 4 Dead",
    slug: "l4d",
    app_id: app(222840),
    executable: "./srcds_run",
    args: &["-game", "left4dead"],
};

static ALL_SERVERS: [ServerDefinition; 9] = [
    ARMA3,
    RUST,
    CSGO,
    DONT_STARVE_TOGETHER,
    TF2,
    GARRYS_MOD,
    CSS,
    L4D2,
    L4D,
];

// ============================================================================
// Lookup
// ============================================================================

/// Returns every known server definition.
pub fn all_servers() -> &'static [ServerDefinition] {
    &ALL_SERVERS
}

/// Finds a server by slug, ignoring case.
pub fn find_by_slug(slug: &str) -> Option<&'static ServerDefinition> {
    let slug = slug.trim();
    ALL_SERVERS
        .iter()
        .find(|def| def.slug.eq_ignore_ascii_case(slug))
}

pub fn find_by_app_id(id: AppId) -> Option<&'static ServerDefinition> {
    ALL_SERVERS.iter().find(|def| def.app_id == id)
}

/// Resolves a slug or a numeric app id to an [`AppId`].
///
/// Numeric ids do not need to be in the catalog.
pub fn resolve(input: &str) -> Option<AppId> {
    if let Some(def) = find_by_slug(input) {
        return Some(def.app_id);
    }
    input.parse().ok()
}
