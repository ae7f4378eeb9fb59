// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Route guard
//!
//! Consulted before every navigation. Routes that declare `requires_auth`
//! are only entered while the session is `Authenticated`; otherwise the
//! guard begins a login and the navigation suspends until the shell has
//! followed the redirect and completed the login.

use log::debug;

use crate::error::SessionError;
use crate::session::{LoginRedirect, SessionManager};

/// Navigation metadata of one route
#[derive(Debug, Clone)]
pub struct RouteSpec {
    /// Route name, used for logging only
    pub name: String,
    /// Whether the route requires an authenticated session
    pub requires_auth: bool,
}

impl RouteSpec {
    /// A route anyone may enter
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_auth: false,
        }
    }

    /// A route requiring an authenticated session
    pub fn protected(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires_auth: true,
        }
    }
}

/// What the shell should do with the attempted navigation
#[derive(Debug, Clone)]
pub enum NavigationDecision {
    /// Proceed to the route
    Allowed,
    /// Suspend the navigation, follow the redirect, complete the login,
    /// then check again
    Login(LoginRedirect),
}

/// Gate that consults the session manager before allowing navigation
pub struct RouteGuard {
    session: SessionManager,
}

impl RouteGuard {
    /// Build a guard over the shared session manager
    pub fn new(session: SessionManager) -> Self {
        Self { session }
    }

    /// Decide whether navigation to `route` may proceed
    ///
    /// Public routes are always allowed. Protected routes are allowed only
    /// with a usable access token (an expired one is refreshed first). With
    /// no session, a login is begun and [`NavigationDecision::Login`] is
    /// returned; login failures surface as the typed error and the
    /// navigation does not proceed.
    pub async fn check(&self, route: &RouteSpec) -> Result<NavigationDecision, SessionError> {
        if !route.requires_auth {
            return Ok(NavigationDecision::Allowed);
        }
        match self.session.get_token().await {
            Ok(_) => {
                debug!("navigation to '{}' allowed", route.name);
                Ok(NavigationDecision::Allowed)
            }
            Err(SessionError::NotAuthenticated) | Err(SessionError::SessionExpired { .. }) => {
                debug!(
                    "navigation to '{}' suspended, login required",
                    route.name
                );
                let redirect = self.session.begin_login().await?;
                Ok(NavigationDecision::Login(redirect))
            }
            Err(e) => Err(e),
        }
    }
}
