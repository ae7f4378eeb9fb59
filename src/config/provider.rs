// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Identity Provider Configuration
//!
//! This module defines [`ProviderConfig`], which holds all parameters required
//! to drive OAuth2/OIDC authentication flows against a single identity
//! provider, and [`SessionSettings`], the knobs of the session manager itself.
//!
//! ## Fields
//! - `issuer_url`: Issuer URL of the realm (e.g. `https://idp.example.com/realms/Common`).
//!   Endpoint URLs are derived from it Keycloak-style and may be overridden by
//!   the provider's discovery document during `init`.
//! - `client_id`: OAuth2 client ID registered with the provider. Also the
//!   audience the backend resource server is expected to check.
//! - `client_secret`: Secret for confidential clients; omit for public
//!   (frontend) clients.
//! - `scope`: Space-separated list of OAuth2 scopes to request.
//! - `redirect_uri`: Redirect URI registered for authorization-code callbacks.
//!   Optional — password-grant deployments do not need one.
//! - `audience`: Expected `aud` claim; defaults to `client_id` when absent.
//!
//! Configuration is treated as static for the lifetime of the session manager.

use serde::{Deserialize, Serialize};
use url::Url;

fn default_scope() -> String {
    "openid profile".to_string()
}

fn default_true() -> bool {
    true
}

fn default_http_timeout() -> u64 {
    30
}

/// Configuration for an OIDC identity provider
///
/// Typically loaded from a YAML file via [`crate::config::Config::from_file`],
/// or built programmatically:
///
/// ```
/// use oidc_session::config::ProviderConfig;
///
/// let provider = ProviderConfig::new(
///     "https://idp.example.com/realms/Common".parse().unwrap(),
///     "appstore",
/// )
/// .with_redirect_uri("https://app.example.com/callback".parse().unwrap())
/// .with_scope("openid profile email");
/// assert_eq!(provider.client_id, "appstore");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Issuer URL of the realm
    pub issuer_url: Url,
    /// OAuth2 client ID registered with the provider
    pub client_id: String,
    /// Client secret for confidential clients
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Space-separated list of OAuth2 scopes to request
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Redirect URI registered for authorization-code callbacks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<Url>,
    /// Expected audience claim; defaults to `client_id` when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl ProviderConfig {
    /// Create a configuration with the required fields and default scope
    pub fn new(issuer_url: Url, client_id: impl Into<String>) -> Self {
        Self {
            issuer_url,
            client_id: client_id.into(),
            client_secret: None,
            scope: default_scope(),
            redirect_uri: None,
            audience: None,
        }
    }

    /// Set the client secret (confidential client)
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set the requested scopes (space-separated)
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Set the redirect URI used by the authorization-code flow
    pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
        self.redirect_uri = Some(redirect_uri);
        self
    }

    /// Set the expected audience claim
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// The audience the backend is expected to check (`audience` or `client_id`)
    pub fn expected_audience(&self) -> &str {
        self.audience.as_deref().unwrap_or(&self.client_id)
    }
}

/// Session manager settings
///
/// All fields have defaults so the section can be omitted entirely from the
/// YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Schedule a background refresh ahead of token expiry
    ///
    /// When disabled the session still refreshes lazily inside `get_token`.
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    /// Timeout in seconds applied to every HTTP exchange with the provider
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_refresh: true,
            http_timeout_secs: default_http_timeout(),
        }
    }
}
