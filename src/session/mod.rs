// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Session state machine
//!
//! The session is the central entity of this crate. Exactly one exists per
//! [`SessionManager`] instance, lives for the application run, and is mutated
//! only by the manager's login, refresh, and logout operations.
//!
//! ## States
//!
//! ```text
//! Unauthenticated --login/init--> Authenticating --tokens--> Authenticated
//!       ^                              |                        |    ^
//!       |                         (rejected)              (refresh ok)
//!       |                              v                        v
//!       +----logout (any state)----- Error                   Expired --login--> Authenticating
//! ```
//!
//! - `Authenticated` holds a [`TokenSet`] (access and refresh token together,
//!   so neither can exist without the other) with `expires_at` in the future.
//! - Crossing `expires_at` is detected lazily on `get_token` or proactively by
//!   the scheduled refresh; a failed refresh lands in `Expired`.
//! - Entering `Authenticated` always clears any previous error.
//! - `logout` reaches `Unauthenticated` from every state and never fails.

mod guard;
mod manager;

pub use guard::{NavigationDecision, RouteGuard, RouteSpec};
pub use manager::SessionManager;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::error::SessionError;
use crate::oidc::TokenSet;

/// The five session states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No session; `login` or `init` may start one
    Unauthenticated,
    /// A login exchange is in flight or a redirect is pending completion
    Authenticating,
    /// A valid token set is held
    Authenticated,
    /// The token set expired and could not be refreshed; re-login required
    Expired,
    /// The last login attempt failed; the caller may retry or abandon
    Error,
}

/// Immutable snapshot of the session, as returned by [`SessionManager::session`]
#[derive(Debug, Clone)]
pub struct Session {
    /// Current state
    pub state: SessionState,
    /// Token set, present exactly while `state == Authenticated` or the
    /// tokens are awaiting lazy expiry detection
    pub tokens: Option<TokenSet>,
    /// Cached userinfo claims, populated by `load_user_info`
    pub user_info: Option<UserInfo>,
    /// The error that put the session into `Error` state, if any
    pub last_error: Option<SessionError>,
}

/// Claims fetched from the provider's userinfo endpoint
///
/// Known claims are typed; everything else the provider sends is preserved
/// in the open `extra` map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject identifier
    #[serde(default)]
    pub sub: Option<String>,
    /// Preferred username
    #[serde(default)]
    pub preferred_username: Option<String>,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Email address
    #[serde(default)]
    pub email: Option<String>,
    /// Any claim this crate does not know about
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl UserInfo {
    /// Look up a claim from the open extension set
    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.extra.get(name)
    }
}

/// Tokens persisted by an external layer and offered back at `init`
///
/// The core keeps no storage itself; an application that persists tokens
/// across reloads hands them in here and they are validated by a refresh
/// exchange before being trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTokens {
    /// Previously issued refresh token
    pub refresh_token: String,
}

impl From<&TokenSet> for StoredTokens {
    fn from(tokens: &TokenSet) -> Self {
        Self {
            refresh_token: tokens.refresh_token.clone(),
        }
    }
}

/// What `init` should do when no session is established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnLoad {
    /// Force a login: `init` returns a redirect the shell must follow
    LoginRequired,
    /// Silently check for an existing session, never force a redirect
    #[default]
    CheckSso,
}

/// Options for [`SessionManager::init`]
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Bootstrap behavior when unauthenticated
    pub on_load: OnLoad,
    /// Tokens recovered by an external persistence layer, if any
    pub tokens: Option<StoredTokens>,
}

/// Result of [`SessionManager::init`]
#[derive(Debug, Clone)]
pub struct InitOutcome {
    /// Whether the session ended up `Authenticated`
    pub authenticated: bool,
    /// Redirect to follow when `on_load` was `LoginRequired` and no session
    /// could be established silently
    pub login: Option<LoginRedirect>,
}

/// First half of the two-phase authorization-code login
///
/// Control genuinely leaves the process during a browser redirect, so login
/// is split: `begin_login` produces this redirect target, the shell navigates
/// to it, and `complete_login` resumes with the callback parameters.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    /// Fully parameterized authorization endpoint URL
    pub authorization_url: Url,
    /// CSRF state parameter; echoed back by the provider in the callback
    pub state: String,
}

/// Parameters the provider sends back to the redirect URI
#[derive(Debug, Clone, Default)]
pub struct CallbackParams {
    /// Authorization code to exchange for tokens
    pub code: Option<String>,
    /// Echoed CSRF state parameter
    pub state: Option<String>,
    /// Error code when the provider rejected or the user denied the request
    pub error: Option<String>,
    /// Human-readable error description
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse the callback parameters out of the full redirect URL
    pub fn from_redirect_url(url: &Url) -> Self {
        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_params_parse_from_redirect_url() {
        let url: Url = "https://app.example.com/callback?code=abc123&state=xyz&foo=bar"
            .parse()
            .unwrap();
        let params = CallbackParams::from_redirect_url(&url);
        assert_eq!(params.code.as_deref(), Some("abc123"));
        assert_eq!(params.state.as_deref(), Some("xyz"));
        assert!(params.error.is_none());
    }

    #[test]
    fn callback_params_capture_provider_errors() {
        let url: Url =
            "https://app.example.com/callback?error=access_denied&error_description=denied&state=xyz"
                .parse()
                .unwrap();
        let params = CallbackParams::from_redirect_url(&url);
        assert!(params.code.is_none());
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("denied"));
    }

    #[test]
    fn user_info_preserves_unknown_claims() {
        let json = serde_json::json!({
            "sub": "1234",
            "preferred_username": "alice",
            "realm_access": { "roles": ["user"] }
        });
        let info: UserInfo = serde_json::from_value(json).unwrap();
        assert_eq!(info.preferred_username.as_deref(), Some("alice"));
        assert!(info.claim("realm_access").is_some());
        assert!(info.claim("missing").is_none());
    }
}
