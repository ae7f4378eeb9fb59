// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Identity provider endpoint resolution
//!
//! Endpoint URLs are first derived from the issuer URL using the Keycloak
//! path layout (`{issuer}/protocol/openid-connect/...`), which makes the
//! manager usable without any network exchange. During `init` the provider's
//! discovery document (`{issuer}/.well-known/openid-configuration`) is
//! fetched and its URLs take precedence over the derived defaults.

use serde::Deserialize;
use url::Url;

use crate::error::SessionError;

/// OpenID Connect discovery document (the subset this crate consumes)
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// Issuer identifier as published by the provider
    pub issuer: String,
    /// Authorization endpoint for the code flow
    pub authorization_endpoint: String,
    /// Token endpoint for every grant exchange
    pub token_endpoint: String,
    /// Userinfo endpoint
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
    /// End-session (logout) endpoint
    #[serde(default)]
    pub end_session_endpoint: Option<String>,
}

/// Resolved endpoint URLs of one identity provider
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Authorization endpoint (browser redirect target)
    pub authorization: Url,
    /// Token endpoint (password, code, and refresh grants)
    pub token: Url,
    /// Userinfo endpoint
    pub userinfo: Url,
    /// End-session endpoint, notified best-effort on logout
    pub end_session: Url,
    /// Discovery document URL
    pub discovery: Url,
}

impl ProviderEndpoints {
    /// Derive endpoints from the issuer URL using the Keycloak path layout
    pub fn from_issuer(issuer: &Url) -> Result<Self, SessionError> {
        let base = issuer.as_str().trim_end_matches('/');
        let parse = |suffix: &str| -> Result<Url, SessionError> {
            Url::parse(&format!("{}/{}", base, suffix)).map_err(|e| SessionError::Config {
                reason: format!("cannot derive endpoint from issuer '{}': {}", issuer, e),
            })
        };
        Ok(Self {
            authorization: parse("protocol/openid-connect/auth")?,
            token: parse("protocol/openid-connect/token")?,
            userinfo: parse("protocol/openid-connect/userinfo")?,
            end_session: parse("protocol/openid-connect/logout")?,
            discovery: parse(".well-known/openid-configuration")?,
        })
    }

    /// Replace the derived URLs with the ones the provider published
    ///
    /// Endpoints absent from the document keep their derived value.
    pub fn apply_discovery(&mut self, doc: &DiscoveryDocument) -> Result<(), SessionError> {
        let parse = |field: &str, value: &str| -> Result<Url, SessionError> {
            Url::parse(value).map_err(|e| SessionError::Provider {
                reason: format!("discovery document has invalid {}: {}", field, e),
            })
        };
        self.authorization = parse("authorization_endpoint", &doc.authorization_endpoint)?;
        self.token = parse("token_endpoint", &doc.token_endpoint)?;
        if let Some(userinfo) = &doc.userinfo_endpoint {
            self.userinfo = parse("userinfo_endpoint", userinfo)?;
        }
        if let Some(end_session) = &doc.end_session_endpoint {
            self.end_session = parse("end_session_endpoint", end_session)?;
        }
        Ok(())
    }
}
