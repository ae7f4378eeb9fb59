// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration loading and validation
//!
//! The configuration is a YAML document with two sections:
//!
//! ```yaml
//! provider:
//!   issuer_url: https://idp.example.com/realms/Common
//!   client_id: appstore
//!   client_secret: K5egGlT3AlaQxy3VsG1Q4TB9sHYvX7ME
//!   scope: openid profile
//!   redirect_uri: https://app.example.com/callback
//! session:
//!   auto_refresh: true
//!   http_timeout_secs: 30
//! ```
//!
//! `session` may be omitted; every field of it has a default. Validation goes
//! beyond what serde can express (scheme checks, non-empty identifiers) and
//! reports descriptive errors eagerly, before any network exchange happens.

mod provider;

pub use provider::{ProviderConfig, SessionSettings};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Identity provider parameters
    pub provider: ProviderConfig,
    /// Session manager settings
    #[serde(default)]
    pub session: SessionSettings,
}

impl Config {
    /// Load and validate a configuration from a YAML file
    ///
    /// ### Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    ///
    /// ### Returns
    ///
    /// The parsed [`Config`], or an error describing what is wrong with the
    /// file or its content.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let config: Config = serde_yml::from_str(&content)
            .with_context(|| format!("Failed to parse configuration file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration programmatically
    pub fn new(provider: ProviderConfig) -> Self {
        Self {
            provider,
            session: SessionSettings::default(),
        }
    }

    /// Override the session settings
    pub fn with_session(mut self, session: SessionSettings) -> Self {
        self.session = session;
        self
    }

    /// Validate rules that the type system and serde cannot express
    ///
    /// ### Validation Rules
    ///
    /// - the issuer URL uses the `http` or `https` scheme
    /// - the client ID is not empty
    /// - the requested scope is not empty
    /// - the HTTP timeout is not zero
    pub fn validate(&self) -> Result<()> {
        let scheme = self.provider.issuer_url.scheme();
        if scheme != "http" && scheme != "https" {
            anyhow::bail!(
                "issuer_url must use http or https, got scheme '{}'",
                scheme
            );
        }
        if self.provider.client_id.trim().is_empty() {
            anyhow::bail!("client_id must not be empty");
        }
        if self.provider.scope.trim().is_empty() {
            anyhow::bail!("scope must not be empty");
        }
        if self.session.http_timeout_secs == 0 {
            anyhow::bail!("http_timeout_secs must be greater than zero");
        }
        if !self
            .provider
            .scope
            .split_whitespace()
            .any(|s| s == "openid")
        {
            log::warn!(
                "requested scope '{}' does not include 'openid'; the provider may not issue an OIDC session",
                self.provider.scope
            );
        }
        Ok(())
    }
}
