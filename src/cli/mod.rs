//! CLI entry point for popauth.

pub mod auth;

use clap::{Parser, Subcommand};

/// popauth CLI
#[derive(Parser, Debug)]
#[command(name = "popauth", version, about = "popauth: popup login bridge CLI")]
pub struct Cli {
    /// API origin (overrides POPAUTH_API_BASE)
    #[arg(long, global = true)]
    pub api_base: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authentication management
    Auth(AuthArgs),
    /// Send an authenticated request to the API
    Request(RequestArgs),
}

/// Arguments for the `auth` subcommand group.
#[derive(Parser, Debug)]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

/// Auth subcommands.
#[derive(Subcommand, Debug)]
pub enum AuthCommands {
    /// Show authentication status
    Status,
    /// Store the JSON payload shown by the auth callback page
    Import(ImportArgs),
    /// Show the signed-in user
    Whoami,
    /// Revoke the refresh token and forget stored tokens
    Logout,
}

/// Arguments for `popauth auth import`.
#[derive(Parser, Debug)]
pub struct ImportArgs {
    /// Payload JSON, e.g. {"jwt": "...", "refresh_token": "..."}; read from stdin when omitted
    pub payload: Option<String>,
}

/// Arguments for `popauth request`.
#[derive(Parser, Debug)]
pub struct RequestArgs {
    /// Path relative to the API origin, e.g. /me
    pub path: String,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// JSON request body
    #[arg(long)]
    pub json: Option<String>,
}
