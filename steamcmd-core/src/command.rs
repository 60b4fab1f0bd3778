//! The SteamCMD command-line grammar.
//!
//! SteamCMD accepts a script on its argument list: every command starts with
//! a `+`-prefixed token followed by its parameters, executed in order. This
//! module only produces arguments; it never interprets steamcmd's output.

use std::path::PathBuf;

use crate::config::Credentials;
use crate::types::AppId;

/// A single command in a SteamCMD argument script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SteamCommand {
    /// `+login anonymous`
    LoginAnonymous,
    /// `+login <username> <password>`; the password ends up in the child's argv.
    Login { username: String, password: String },
    /// `+force_install_dir <path>`
    ForceInstallDir(PathBuf),
    /// `+app_update <id> [validate]`
    AppUpdate { app_id: AppId, validate: bool },
    /// `+quit`
    Quit,
}

impl SteamCommand {
    /// Builds the login command for optional credentials.
    pub fn login(credentials: Option<&Credentials>) -> Self {
        match credentials {
            Some(c) => Self::Login {
                username: c.username.clone(),
                password: c.password.clone(),
            },
            None => Self::LoginAnonymous,
        }
    }

    /// Appends this command's tokens to `args`.
    pub fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Self::LoginAnonymous => {
                args.push("+login".to_string());
                args.push("anonymous".to_string());
            }
            Self::Login { username, password } => {
                args.push("+login".to_string());
                args.push(username.clone());
                if !password.is_empty() {
                    args.push(password.clone());
                }
            }
            Self::ForceInstallDir(path) => {
                args.push("+force_install_dir".to_string());
                args.push(path.to_string_lossy().into_owned());
            }
            Self::AppUpdate { app_id, validate } => {
                args.push("+app_update".to_string());
                args.push(app_id.to_string());
                if *validate {
                    args.push("validate".to_string());
                }
            }
            Self::Quit => args.push("+quit".to_string()),
        }
    }
}

/// Flattens a command script into arguments, always terminated by `+quit`.
///
/// Without the trailing `+quit` steamcmd drops into its interactive prompt
/// and never exits.
pub fn build_args(commands: &[SteamCommand]) -> Vec<String> {
    let mut args = Vec::new();
    for command in commands
        .iter()
        .filter(|c| !matches!(c, SteamCommand::Quit))
    {
        command.push_args(&mut args);
    }
    SteamCommand::Quit.push_args(&mut args);
    args
}
