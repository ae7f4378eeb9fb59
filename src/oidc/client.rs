// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! HTTP client for the identity provider's OIDC endpoints
//!
//! This is the only place in the crate that talks to the provider. All token
//! exchanges are form-encoded POSTs to the token endpoint, differing only in
//! their `grant_type` and grant-specific fields:
//!
//! | Grant                | Extra fields                                  |
//! |----------------------|-----------------------------------------------|
//! | `password`           | `username`, `password`, `scope`               |
//! | `authorization_code` | `code`, `redirect_uri`, `code_verifier`       |
//! | `refresh_token`      | `refresh_token`                               |
//!
//! `client_id` (and `client_secret` for confidential clients) is attached to
//! every exchange. Error mapping is uniform: transport failures become
//! [`SessionError::Network`], 400/401 responses with an OAuth error body
//! become [`SessionError::Authentication`], anything else non-conforming
//! becomes [`SessionError::Provider`].

use log::{debug, warn};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::RwLock;
use url::Url;

use crate::config::{ProviderConfig, SessionSettings};
use crate::error::SessionError;
use crate::oidc::endpoints::{DiscoveryDocument, ProviderEndpoints};
use crate::oidc::pkce::PkceChallenge;
use crate::oidc::token::TokenResponse;
use crate::session::UserInfo;

/// OAuth error body (RFC 6749 §5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Wire-protocol client for one identity provider
pub struct OidcClient {
    http: reqwest::Client,
    config: ProviderConfig,
    endpoints: RwLock<ProviderEndpoints>,
}

impl OidcClient {
    /// Build a client with endpoints derived from the configured issuer URL
    pub fn new(config: ProviderConfig, settings: &SessionSettings) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(settings.http_timeout_secs))
            .build()
            .map_err(|e| SessionError::Config {
                reason: format!("cannot build HTTP client: {}", e),
            })?;
        let endpoints = ProviderEndpoints::from_issuer(&config.issuer_url)?;
        Ok(Self {
            http,
            config,
            endpoints: RwLock::new(endpoints),
        })
    }

    /// The provider configuration this client was built with
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Snapshot of the currently resolved endpoints
    pub async fn endpoints(&self) -> ProviderEndpoints {
        self.endpoints.read().await.clone()
    }

    /// Fetch the discovery document and adopt the endpoint URLs it publishes
    ///
    /// Doubles as the reachability probe during `init`.
    pub async fn discover(&self) -> Result<DiscoveryDocument, SessionError> {
        let discovery_url = self.endpoints.read().await.discovery.clone();
        debug!("fetching discovery document from {}", discovery_url);
        let response = self
            .http
            .get(discovery_url.clone())
            .send()
            .await
            .map_err(|e| SessionError::network(&discovery_url, &e))?;
        if !response.status().is_success() {
            return Err(SessionError::Provider {
                reason: format!(
                    "discovery endpoint returned HTTP {}",
                    response.status().as_u16()
                ),
            });
        }
        let doc: DiscoveryDocument = response.json().await.map_err(|e| SessionError::Provider {
            reason: format!("discovery document is not valid JSON: {}", e),
        })?;
        self.endpoints.write().await.apply_discovery(&doc)?;
        debug!("adopted endpoints published by issuer {}", doc.issuer);
        Ok(doc)
    }

    /// Build the authorization URL for the code flow
    ///
    /// Fails with [`SessionError::Config`] when no redirect URI is configured.
    pub async fn authorization_url(
        &self,
        state: &str,
        pkce: &PkceChallenge,
    ) -> Result<Url, SessionError> {
        let redirect_uri = self.redirect_uri()?;
        let mut url = self.endpoints.read().await.authorization.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("scope", &self.config.scope)
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.challenge)
            .append_pair("code_challenge_method", PkceChallenge::METHOD);
        Ok(url)
    }

    /// Resource-owner-password grant
    pub async fn password_grant(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenResponse, SessionError> {
        self.post_token(vec![
            ("grant_type", "password".to_string()),
            ("username", username.to_string()),
            ("password", password.to_string()),
            ("scope", self.config.scope.clone()),
        ])
        .await
    }

    /// Authorization-code grant: exchange the callback code for tokens
    pub async fn authorization_code_grant(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<TokenResponse, SessionError> {
        let redirect_uri = self.redirect_uri()?;
        self.post_token(vec![
            ("grant_type", "authorization_code".to_string()),
            ("code", code.to_string()),
            ("redirect_uri", redirect_uri.to_string()),
            ("code_verifier", code_verifier.to_string()),
        ])
        .await
    }

    /// Refresh grant: mint a new token set from the refresh token
    pub async fn refresh_grant(&self, refresh_token: &str) -> Result<TokenResponse, SessionError> {
        self.post_token(vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
        ])
        .await
    }

    /// Fetch claims from the userinfo endpoint with the given access token
    pub async fn fetch_user_info(&self, access_token: &str) -> Result<UserInfo, SessionError> {
        let userinfo_url = self.endpoints.read().await.userinfo.clone();
        debug!("fetching userinfo from {}", userinfo_url);
        let response = self
            .http
            .get(userinfo_url.clone())
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| SessionError::network(&userinfo_url, &e))?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(SessionError::NotAuthenticated),
            status if !status.is_success() => Err(SessionError::Provider {
                reason: format!("userinfo endpoint returned HTTP {}", status.as_u16()),
            }),
            _ => response.json().await.map_err(|e| SessionError::Provider {
                reason: format!("userinfo response is not valid JSON: {}", e),
            }),
        }
    }

    /// Notify the end-session endpoint that the refresh token is discarded
    ///
    /// The caller treats this as best-effort; the error is informational.
    pub async fn end_session(&self, refresh_token: &str) -> Result<(), SessionError> {
        let end_session_url = self.endpoints.read().await.end_session.clone();
        debug!("notifying end-session endpoint {}", end_session_url);
        let mut params = vec![
            ("client_id", self.config.client_id.clone()),
            ("refresh_token", refresh_token.to_string()),
        ];
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.clone()));
        }
        let response = self
            .http
            .post(end_session_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| SessionError::network(&end_session_url, &e))?;
        if !response.status().is_success() {
            return Err(SessionError::Provider {
                reason: format!(
                    "end-session endpoint returned HTTP {}",
                    response.status().as_u16()
                ),
            });
        }
        Ok(())
    }

    fn redirect_uri(&self) -> Result<&Url, SessionError> {
        self.config
            .redirect_uri
            .as_ref()
            .ok_or_else(|| SessionError::Config {
                reason: "authorization-code flow requires a configured redirect_uri".to_string(),
            })
    }

    /// POST one grant exchange to the token endpoint
    async fn post_token(
        &self,
        mut params: Vec<(&'static str, String)>,
    ) -> Result<TokenResponse, SessionError> {
        let token_url = self.endpoints.read().await.token.clone();
        let grant_type = params
            .first()
            .map(|(_, v)| v.clone())
            .unwrap_or_default();
        params.push(("client_id", self.config.client_id.clone()));
        if let Some(secret) = &self.config.client_secret {
            params.push(("client_secret", secret.clone()));
        }
        debug!("token exchange grant_type={} against {}", grant_type, token_url);

        let response = self
            .http
            .post(token_url.clone())
            .form(&params)
            .send()
            .await
            .map_err(|e| SessionError::network(&token_url, &e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            let reason = match response.json::<OAuthErrorBody>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {}", body.error, description),
                    None => body.error,
                },
                Err(_) => format!("HTTP {}", status.as_u16()),
            };
            warn!(
                "token exchange grant_type={} rejected: {}",
                grant_type, reason
            );
            return Err(SessionError::Authentication { reason });
        }
        if !status.is_success() {
            return Err(SessionError::Provider {
                reason: format!("token endpoint returned HTTP {}", status.as_u16()),
            });
        }
        response.json().await.map_err(|e| SessionError::Provider {
            reason: format!("token response is not valid JSON: {}", e),
        })
    }
}
