// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared scaffolding for the integration tests: a wiremock identity
//! provider speaking the Keycloak path layout, and a session manager
//! pointed at it.

#![allow(dead_code)]

use oidc_session::config::{Config, ProviderConfig, SessionSettings};
use oidc_session::session::SessionManager;
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const REALM_PATH: &str = "/realms/Common";
pub const TOKEN_PATH: &str = "/realms/Common/protocol/openid-connect/token";
pub const USERINFO_PATH: &str = "/realms/Common/protocol/openid-connect/userinfo";
pub const LOGOUT_PATH: &str = "/realms/Common/protocol/openid-connect/logout";
pub const DISCOVERY_PATH: &str = "/realms/Common/.well-known/openid-configuration";

/// A token endpoint response body
pub fn token_body(access: &str, refresh: &str, expires_in: u64) -> serde_json::Value {
    json!({
        "access_token": access,
        "refresh_token": refresh,
        "expires_in": expires_in,
        "token_type": "Bearer"
    })
}

/// An RFC 6749 error body
pub fn oauth_error(error: &str, description: &str) -> serde_json::Value {
    json!({ "error": error, "error_description": description })
}

/// The discovery document the mock realm publishes
pub fn discovery_body(base_uri: &str) -> serde_json::Value {
    json!({
        "issuer": format!("{}{}", base_uri, REALM_PATH),
        "authorization_endpoint": format!("{}{}/protocol/openid-connect/auth", base_uri, REALM_PATH),
        "token_endpoint": format!("{}{}", base_uri, TOKEN_PATH),
        "userinfo_endpoint": format!("{}{}", base_uri, USERINFO_PATH),
        "end_session_endpoint": format!("{}{}", base_uri, LOGOUT_PATH)
    })
}

/// Build a session manager against the mock provider
pub fn manager_for(server: &MockServer, auto_refresh: bool) -> SessionManager {
    let issuer: url::Url = format!("{}{}", server.uri(), REALM_PATH).parse().unwrap();
    let provider = ProviderConfig::new(issuer, "appstore")
        .with_redirect_uri("https://app.example.com/callback".parse().unwrap());
    let settings = SessionSettings {
        auto_refresh,
        ..SessionSettings::default()
    };
    SessionManager::new(Config::new(provider).with_session(settings)).unwrap()
}

/// Mount a password-grant success for `alice`/`pw`
pub async fn mount_password_grant(server: &MockServer, access: &str, refresh: &str, expires_in: u64) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("username=alice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh, expires_in)))
        .mount(server)
        .await;
}

/// Mount a refresh-grant success for the given refresh token
pub async fn mount_refresh_grant(
    server: &MockServer,
    old_refresh: &str,
    access: &str,
    refresh: &str,
    expires_in: u64,
) {
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains(format!("refresh_token={}", old_refresh)))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(access, refresh, expires_in)))
        .mount(server)
        .await;
}

/// Mount the discovery document
pub async fn mount_discovery(server: &MockServer) {
    let body = discovery_body(&server.uri());
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}
