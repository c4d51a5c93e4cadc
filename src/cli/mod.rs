//! CLI entry point for device-auth.

pub mod auth;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Device-code login for GitHub Copilot
#[derive(Parser, Debug)]
#[command(name = "device-auth", version, about = "OAuth device-code login CLI")]
pub struct Cli {
    /// TOML config file layered under DEVICE_AUTH_* environment variables
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Credential profile to use
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Log filter (overrides DEVICE_AUTH_LOG / RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in with a device code
    Login(LoginArgs),
    /// Show authentication status
    Status(StatusArgs),
    /// Forget the stored credential
    Logout,
    /// Print a valid Copilot API token
    Token,
}

/// Arguments for `device-auth login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Open the verification page in the default browser
    #[arg(long)]
    pub open: bool,
}

/// Arguments for `device-auth status`.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Print the status as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
