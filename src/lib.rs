// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # oidc-session
//!
//! Client-side OpenID Connect session lifecycle manager. The crate lets an
//! application shell authenticate a user against an external identity
//! provider, hold the resulting session in memory, keep it fresh through
//! silent refresh, gate protected routes, and attach the access token to
//! outbound API calls so a backend can authorize requests by audience claim.
//!
//! ## Components
//!
//! * [`session::SessionManager`] — owns the session state machine, drives the
//!   OIDC flows (password and two-phase authorization-code grants), schedules
//!   the silent refresh, and hands out tokens
//! * [`session::RouteGuard`] — consults the session before every navigation
//! * [`api::ApiClient`] — bearer-token HTTP client for the protected backend
//!   with the one refresh-then-retry on 401/403
//! * [`oidc`] — the wire-protocol layer (endpoints, discovery, grants, PKCE)
//! * [`config`] — YAML/programmatic configuration
//!
//! ## Usage
//!
//! ```no_run
//! use oidc_session::config::{Config, ProviderConfig};
//! use oidc_session::session::{InitOptions, SessionManager, OnLoad};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let provider = ProviderConfig::new(
//!     "https://idp.example.com/realms/Common".parse()?,
//!     "appstore",
//! );
//! let manager = SessionManager::new(Config::new(provider))?;
//!
//! let outcome = manager.init(InitOptions { on_load: OnLoad::CheckSso, tokens: None }).await?;
//! if !outcome.authenticated {
//!     manager.login_with_credentials("alice", "pw").await?;
//! }
//! let token = manager.get_token().await?;
//! # let _ = token;
//! # Ok(()) }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod oidc;
pub mod session;

// Re-export the types most applications touch
pub use api::ApiClient;
pub use config::{Config, ProviderConfig, SessionSettings};
pub use error::SessionError;
pub use session::{
    CallbackParams, InitOptions, InitOutcome, LoginRedirect, NavigationDecision, OnLoad,
    RouteGuard, RouteSpec, Session, SessionManager, SessionState, StoredTokens, UserInfo,
};
