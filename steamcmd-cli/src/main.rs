//! SteamCMD provisioner
//!
//! Bootstraps SteamCMD and installs dedicated server apps from the command line.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use steamcmd_core::{
    all_servers, find_by_app_id, paths, resolve, AppId, Credentials, SteamCmd, SteamCmdConfig,
    EXIT_NO_SUBSCRIPTION,
};

#[derive(Parser, Debug)]
#[command(name = "steamcmd-provision", version, about)]
struct Cli {
    /// JSON settings file; environment variables and flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory SteamCMD is installed into
    #[arg(long, global = true)]
    steamcmd_dir: Option<PathBuf>,

    /// Directory apps are installed under
    #[arg(long, global = true)]
    install_root: Option<PathBuf>,

    /// Forward steamcmd output and enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Steam account to log in with instead of anonymous
    #[arg(long, global = true)]
    username: Option<String>,

    /// Password for --username; visible in the process list while steamcmd runs
    #[arg(long, global = true, env = "STEAMCMD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download SteamCMD if it is not installed yet
    Bootstrap,
    /// Install or update apps by slug or numeric app id
    Install {
        #[arg(required = true, value_name = "APP")]
        apps: Vec<String>,
    },
    /// Print the install directory of an app
    Path {
        #[arg(value_name = "APP")]
        app: String,
    },
    /// List known dedicated servers
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("steamcmd_core={}", default_level).parse()?)
                .add_directive(format!("steamcmd_provision={}", default_level).parse()?)
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    tracing::debug!("Starting steamcmd-provision v{}", steamcmd_core::VERSION);

    // steamcmd runs in its own process group and misses the terminal's SIGINT;
    // dropping the run on Ctrl-C kills it instead.
    tokio::select! {
        result = run(&cli) => result,
        _ = tokio::signal::ctrl_c() => bail!("Interrupted"),
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let env = |key: &str| std::env::var(key).ok();

    match &cli.command {
        Command::List => {
            list_servers();
            Ok(())
        }
        Command::Path { app } => {
            let config = load_config(cli, env)?;
            println!("{}", app_path(&config, app)?.display());
            Ok(())
        }
        Command::Bootstrap => {
            let steam = SteamCmd::new(bootstrap_config(load_config(cli, env)?)?)?;
            steam
                .ensure_installed()
                .await
                .context("Failed to bootstrap SteamCMD")?;
            println!("{}", steam.entry_point().display());
            Ok(())
        }
        Command::Install { apps } => {
            let ids = apps
                .iter()
                .map(|app| parse_app(app))
                .collect::<Result<Vec<_>>>()?;
            let config = load_config(cli, env)?;
            require_steamcmd_dir(&config)?;
            require_install_root(&config)?;
            let steam = SteamCmd::new(config)?;
            install_all(&steam, &ids).await
        }
    }
}

/// Builds settings from the config file, then the environment, then flags.
fn load_config<F>(cli: &Cli, env: F) -> Result<SteamCmdConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let config = match &cli.config {
        Some(path) => SteamCmdConfig::load(path)?,
        None => SteamCmdConfig::default(),
    };
    let mut config = config.with_env_overrides(env);

    if let Some(dir) = &cli.steamcmd_dir {
        config.steamcmd_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.install_root {
        config.install_root = Some(dir.clone());
    }
    if let Some(username) = &cli.username {
        let password = cli.password.clone().unwrap_or_default();
        config.credentials = Some(Credentials::new(username.clone(), password));
    }
    if cli.debug {
        config.debug = true;
    }

    Ok(config)
}

// ============================================================================
// Directory Requirements
// ============================================================================
//
// The library falls back to fresh temp dirs, which are useless across CLI
// invocations, so every command that touches disk needs them configured.

fn require_steamcmd_dir(config: &SteamCmdConfig) -> Result<&Path> {
    config.steamcmd_dir.as_deref().ok_or_else(|| {
        anyhow!("No SteamCMD directory configured; pass --steamcmd-dir or set STEAMCMD_DIR")
    })
}

fn require_install_root(config: &SteamCmdConfig) -> Result<&Path> {
    config.install_root.as_deref().ok_or_else(|| {
        anyhow!("No install root configured; pass --install-root or set STEAMCMD_INSTALL_ROOT")
    })
}

/// Resolves where an app lives without creating anything.
fn app_path(config: &SteamCmdConfig, app: &str) -> Result<PathBuf> {
    let id = parse_app(app)?;
    Ok(paths::app_dir(require_install_root(config)?, id))
}

/// Settings for `bootstrap`, which needs only the SteamCMD directory.
fn bootstrap_config(mut config: SteamCmdConfig) -> Result<SteamCmdConfig> {
    let tool_dir = require_steamcmd_dir(&config)?.to_path_buf();
    // Bootstrapping never touches the install root.
    config.install_root.get_or_insert(tool_dir);
    Ok(config)
}

fn parse_app(input: &str) -> Result<AppId> {
    resolve(input).ok_or_else(|| {
        anyhow!(
            "Unknown app '{}'. Use a numeric app id or one of the slugs from `list`",
            input
        )
    })
}

/// Installs every app concurrently against one instance; its lock runs them one at a time.
async fn install_all(steam: &SteamCmd, ids: &[AppId]) -> Result<()> {
    steam
        .ensure_installed()
        .await
        .context("Failed to bootstrap SteamCMD")?;

    let results = futures::future::join_all(ids.iter().map(|&id| async move {
        (id, steam.install_or_update_app(id).await)
    }))
    .await;

    let mut failures = 0;
    for (id, result) in results {
        let label = display_name(id);
        match result {
            Ok(()) => println!("{} -> {}", label, steam.get_app_path(id).display()),
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", label, e);
                if e.exit_code() == Some(EXIT_NO_SUBSCRIPTION) {
                    eprintln!("  the account has no license for this app; try --username");
                }
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} installs failed", failures, ids.len());
    }
    Ok(())
}

fn display_name(id: AppId) -> String {
    match find_by_app_id(id) {
        Some(def) => format!("{} ({})", def.name, id),
        None => id.to_string(),
    }
}

fn list_servers() {
    println!("{:<8} {:>8}  {:<34} LAUNCH", "SLUG", "APP ID", "NAME");
    for def in all_servers() {
        println!(
            "{:<8} {:>8}  {:<34} {}",
            def.slug,
            def.app_id,
            def.name,
            def.launch_command()
        );
    }
}
