// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! OIDC wire-protocol layer
//!
//! This submodule handles everything that crosses the network between the
//! session manager and the identity provider: endpoint resolution and
//! discovery, token grant exchanges, PKCE material, and the token wire
//! format. It holds no session state — that belongs to
//! [`crate::session::SessionManager`].

mod client;
mod endpoints;
mod pkce;
mod token;

// Re-export public API
pub use client::OidcClient;
pub use endpoints::{DiscoveryDocument, ProviderEndpoints};
pub use pkce::PkceChallenge;
pub use token::{peek_claims, TokenResponse, TokenSet, UnverifiedClaims};
