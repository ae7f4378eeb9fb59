// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Command-line login utility
//!
//! Performs a resource-owner-password login against an OIDC provider and
//! prints the resulting token set. Useful for smoke-testing a realm/client
//! configuration and for minting tokens during backend development.
//!
//! ### Example
//!
//! ```bash
//! token_login --config config.yaml --user alice --password pw
//! token_login --issuer https://idp.example.com/realms/Common \
//!     --client-id appstore --user alice --password pw --user-info
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use url::Url;

use oidc_session::config::{Config, ProviderConfig};
use oidc_session::session::SessionManager;

/// Obtain an access token from an OIDC provider via the password grant
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML configuration file (alternative to --issuer/--client-id)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Issuer URL of the realm
    #[arg(long)]
    issuer: Option<Url>,

    /// OAuth2 client ID
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret for confidential clients
    #[arg(long)]
    client_secret: Option<String>,

    /// Username to authenticate
    #[arg(long)]
    user: String,

    /// Password to authenticate with
    #[arg(long)]
    password: String,

    /// Also fetch and print the userinfo claims
    #[arg(long)]
    user_info: bool,

    /// Only print the access token (for shell substitution)
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => {
            let issuer = args
                .issuer
                .clone()
                .context("either --config or --issuer is required")?;
            let client_id = args
                .client_id
                .clone()
                .context("either --config or --client-id is required")?;
            let mut provider = ProviderConfig::new(issuer, client_id);
            if let Some(secret) = &args.client_secret {
                provider = provider.with_client_secret(secret);
            }
            Config::new(provider)
        }
    };

    let manager = SessionManager::new(config)?;
    manager
        .login_with_credentials(&args.user, &args.password)
        .await?;

    let session = manager.session().await;
    let tokens = session
        .tokens
        .context("login succeeded but no token set is held")?;

    if args.quiet {
        println!("{}", tokens.access_token);
    } else {
        println!("Access token:  {}", tokens.access_token);
        println!("Refresh token: {}", tokens.refresh_token);
        println!("Token type:    {}", tokens.token_type);
        println!("Expires at:    {}", tokens.expires_at);
        if let Some(audience) = &tokens.audience {
            println!("Audience:      {}", audience);
        }
    }

    if args.user_info {
        let info = manager.load_user_info().await?;
        println!(
            "User info:     {}",
            serde_json::to_string_pretty(&info).context("cannot serialize userinfo")?
        );
    }

    Ok(())
}
