//! CLI argument parsing via clap.

use clap::{Parser, Subcommand};

/// Session client for the parish administration backend.
#[derive(Debug, Parser)]
#[command(name = "sacristan", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (default: ./sacristan.toml or
    /// ~/.config/sacristan/sacristan.toml).
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override backend base URL.
    #[arg(long = "base-url")]
    pub base_url: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and persist the session.
    Login {
        /// Account email. Prompted for when omitted.
        email: Option<String>,
    },
    /// Show whether a stored session is still usable.
    Status,
    /// End the stored session.
    Logout,
    /// Show the signed-in user's profile.
    Whoami,
    /// List the permission catalog.
    Permissions,
}
