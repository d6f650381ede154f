//! popauth CLI binary entry point.

use clap::Parser;
use popauth::cli::{AuthCommands, Cli, Commands};
use popauth::config::PopauthConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match PopauthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(2);
        }
    };
    if let Some(base) = cli.api_base {
        config.api_base_override = Some(base);
    }
    let config = config.install();

    let result = match cli.command {
        Commands::Auth(auth_args) => match auth_args.command {
            AuthCommands::Status => popauth::cli::auth::handle_status(config),
            AuthCommands::Import(args) => popauth::cli::auth::handle_import(config, args.payload),
            AuthCommands::Whoami => popauth::cli::auth::handle_whoami(config).await,
            AuthCommands::Logout => popauth::cli::auth::handle_logout(config).await,
        },
        Commands::Request(args) => {
            popauth::cli::auth::handle_request(config, &args.path, &args.method, args.json).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
