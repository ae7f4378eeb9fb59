// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Authenticated backend API client
//!
//! Every request carries `Authorization: Bearer <token>` and
//! `Accept: application/json`. The backend validates the token on its own
//! (signature against the provider's keys, `exp`, and its client id in the
//! `aud` claim); our only obligations are to attach a currently valid token
//! and to treat a 401/403 as the trigger for one refresh-then-retry. A second
//! rejection is surfaced to the caller with no further automatic retries.

use log::{debug, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::error::SessionError;
use crate::session::SessionManager;

/// HTTP client for a protected backend resource server
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    session: SessionManager,
}

impl ApiClient {
    /// Build a client for the backend at `base_url`, drawing tokens from the
    /// shared session manager
    pub fn new(base_url: Url, session: SessionManager) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            session,
        }
    }

    /// GET a backend resource
    pub async fn get(&self, path: &str) -> Result<Response, SessionError> {
        self.request(Method::GET, path, None::<&()>).await
    }

    /// GET a backend resource and deserialize its JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SessionError> {
        let response = self.get(path).await?;
        let url = response.url().clone();
        response.json().await.map_err(|e| SessionError::Provider {
            reason: format!("backend response from {} is not valid JSON: {}", url, e),
        })
    }

    /// POST a JSON body to a backend resource
    pub async fn post_json<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, SessionError> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// Send one authenticated request, retrying once after a refresh when the
    /// backend rejects the bearer token
    async fn request<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<Response, SessionError> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| SessionError::Config {
                reason: format!("invalid API path '{}': {}", path, e),
            })?;

        let token = self.session.get_token().await?;
        let response = self.send(&method, &url, &token, body).await?;
        if !is_auth_rejection(response.status()) {
            return Ok(response);
        }

        debug!(
            "backend rejected bearer token with {}, refreshing and retrying once",
            response.status()
        );
        self.session.force_refresh().await?;
        let token = self.session.get_token().await?;
        let response = self.send(&method, &url, &token, body).await?;
        if is_auth_rejection(response.status()) {
            warn!(
                "backend rejected the refreshed token with {}, giving up",
                response.status()
            );
            return Err(SessionError::Authentication {
                reason: format!(
                    "backend rejected the bearer token with HTTP {}",
                    response.status().as_u16()
                ),
            });
        }
        Ok(response)
    }

    async fn send<B: Serialize>(
        &self,
        method: &Method,
        url: &Url,
        token: &str,
        body: Option<&B>,
    ) -> Result<Response, SessionError> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        request
            .send()
            .await
            .map_err(|e| SessionError::network(url, &e))
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}
