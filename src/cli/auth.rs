//! CLI command handlers.

use std::io::Read;

use reqwest::Method;

use crate::api::{ApiClient, RequestOptions};
use crate::auth::{Credential, Session};
use crate::config::PopauthConfig;
use crate::error::PopauthError;

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Session against the process-wide API origin; `main` installs `config`
/// as the global one before dispatching.
fn session(config: &PopauthConfig) -> Session {
    Session::new(ApiClient::from_global(config.file_token_store()))
}

/// Handle `popauth auth status`.
pub fn handle_status(config: &PopauthConfig) -> CliResult {
    let session = session(config);

    println!("🔐 Authentication Status\n");
    println!("  API:   {}", session.api().base());
    println!(
        "  Store: {} ({})",
        config.store_dir().display(),
        config.storage_origin()
    );
    match session.is_authenticated() {
        Ok(true) => println!("  State: ✅ Logged in"),
        Ok(false) => println!("  State: ❌ Not logged in"),
        Err(e) => println!("  State: ⚠️  Error: {e}"),
    }
    Ok(())
}

/// Handle `popauth auth import [payload]`.
pub fn handle_import(config: &PopauthConfig, payload: Option<String>) -> CliResult {
    let raw = match payload {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };
    let value: serde_json::Value = serde_json::from_str(raw.trim())?;
    let credential = Credential::from_payload(&value)
        .ok_or_else(|| PopauthError::Configuration("payload has no jwt field".to_string()))?;
    session(config).import(&credential)?;
    println!("✅ Credentials stored");
    Ok(())
}

/// Handle `popauth auth whoami`.
pub async fn handle_whoami(config: &PopauthConfig) -> CliResult {
    let user = session(config).current_user().await?;
    match user.display_name {
        Some(name) => println!("{name} <{}>", user.email),
        None => println!("{}", user.email),
    }
    Ok(())
}

/// Handle `popauth auth logout`.
pub async fn handle_logout(config: &PopauthConfig) -> CliResult {
    session(config).logout().await?;
    println!("✅ Logged out");
    Ok(())
}

/// Handle `popauth request <path>`.
pub async fn handle_request(
    config: &PopauthConfig,
    path: &str,
    method: &str,
    json: Option<String>,
) -> CliResult {
    let method: Method = method.to_ascii_uppercase().parse()?;
    let mut options = RequestOptions::new(method);
    if let Some(json) = json {
        options = options.json(serde_json::from_str(&json)?);
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    let body = session(config).api().request(&path, options).await?;
    println!("{body}");
    Ok(())
}
