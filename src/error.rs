// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Session error taxonomy
//!
//! Every fallible operation in this crate surfaces one of the variants below.
//! None of them is fatal to the process: the session manager stays usable in
//! `Unauthenticated` or `Error` state and `login` can always be attempted again.
//!
//! The enum is `Clone` because concurrent callers of an in-flight login or
//! refresh all receive the same result through a shared future (see
//! [`crate::session::SessionManager`]).

use thiserror::Error;

/// Errors surfaced by the session manager and its collaborators
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Transport-level failure (connection refused, timeout, DNS).
    ///
    /// Never retried automatically by this crate; retry policy belongs to the
    /// caller. The one exception is the single refresh-then-retry performed by
    /// [`crate::api::ApiClient`] on a backend 401/403.
    #[error("network error while contacting {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    /// The identity provider rejected the credentials, code, or client.
    ///
    /// Surfaced to the UI layer; no automatic retry.
    #[error("identity provider rejected the request: {reason}")]
    Authentication { reason: String },

    /// The identity provider was unreachable during bootstrap.
    ///
    /// The application may call `init` again.
    #[error("identity provider unreachable during initialization: {reason}")]
    Init { reason: String },

    /// The session expired and the refresh exchange failed.
    ///
    /// The caller must invoke `login` again; no automatic retry happens.
    #[error("session expired and could not be refreshed: {reason}")]
    SessionExpired { reason: String },

    /// A token was requested while no session is established.
    ///
    /// This is a programming error when the route guard is respected, but it
    /// is a distinct catchable condition rather than a panic.
    #[error("no authenticated session, call login first")]
    NotAuthenticated,

    /// The identity provider answered with something the OIDC wire format
    /// does not allow (missing fields, non-JSON body, unexpected status).
    #[error("identity provider returned a malformed response: {reason}")]
    Provider { reason: String },

    /// The supplied configuration is unusable.
    #[error("invalid configuration: {reason}")]
    Config { reason: String },
}

impl SessionError {
    /// Build a `Network` error from a `reqwest` transport failure
    pub(crate) fn network(endpoint: &url::Url, err: &reqwest::Error) -> Self {
        SessionError::Network {
            endpoint: endpoint.to_string(),
            reason: err.to_string(),
        }
    }
}
