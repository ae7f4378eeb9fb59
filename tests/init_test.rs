// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration tests for the `init` bootstrap: discovery probing, stored
//! session restoration, and the `login-required` / `check-sso` behaviors.

mod common;

use common::*;
use oidc_session::config::{Config, ProviderConfig};
use oidc_session::session::SessionManager;
use oidc_session::{InitOptions, OnLoad, SessionError, SessionState, StoredTokens};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn check_sso_without_a_session_stays_unauthenticated() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    let manager = manager_for(&server, false);

    let outcome = manager.init(InitOptions::default()).await.unwrap();
    assert!(!outcome.authenticated);
    assert!(outcome.login.is_none());
    assert_eq!(manager.state().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn login_required_hands_back_a_redirect() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    let manager = manager_for(&server, false);

    let outcome = manager
        .init(InitOptions {
            on_load: OnLoad::LoginRequired,
            tokens: None,
        })
        .await
        .unwrap();
    assert!(!outcome.authenticated);
    let redirect = outcome.login.expect("login-required must produce a redirect");
    assert!(redirect
        .authorization_url
        .as_str()
        .contains("response_type=code"));
    assert_eq!(manager.state().await, SessionState::Authenticating);
}

#[tokio::test]
async fn unreachable_provider_is_an_init_error() {
    // Nothing listens on port 1
    let provider = ProviderConfig::new(
        "http://127.0.0.1:1/realms/Common".parse().unwrap(),
        "appstore",
    );
    let manager = SessionManager::new(Config::new(provider)).unwrap();

    let err = manager.init(InitOptions::default()).await.unwrap_err();
    assert!(matches!(err, SessionError::Init { .. }));
    assert_eq!(manager.state().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn init_is_idempotent_once_authenticated() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_password_grant(&server, "T1", "R1", 60).await;
    let manager = manager_for(&server, false);

    manager.login_with_credentials("alice", "pw").await.unwrap();
    // No discovery exchange happens for an already-authenticated session
    let outcome = manager.init(InitOptions::default()).await.unwrap();
    assert!(outcome.authenticated);
    assert_eq!(manager.get_token().await.unwrap(), "T1");
}

#[tokio::test]
async fn stored_tokens_are_validated_by_a_refresh_exchange() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    mount_refresh_grant(&server, "R-persisted", "T1", "R1", 60).await;
    let manager = manager_for(&server, false);

    let outcome = manager
        .init(InitOptions {
            on_load: OnLoad::CheckSso,
            tokens: Some(StoredTokens {
                refresh_token: "R-persisted".to_string(),
            }),
        })
        .await
        .unwrap();
    assert!(outcome.authenticated);
    assert_eq!(manager.state().await, SessionState::Authenticated);
    assert_eq!(manager.get_token().await.unwrap(), "T1");
}

#[tokio::test]
async fn rejected_stored_tokens_fall_back_to_unauthenticated() {
    let server = MockServer::start().await;
    mount_discovery(&server).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(oauth_error("invalid_grant", "Session not active")),
        )
        .mount(&server)
        .await;
    let manager = manager_for(&server, false);

    let outcome = manager
        .init(InitOptions {
            on_load: OnLoad::CheckSso,
            tokens: Some(StoredTokens {
                refresh_token: "R-stale".to_string(),
            }),
        })
        .await
        .unwrap();
    assert!(!outcome.authenticated);
    assert_eq!(manager.state().await, SessionState::Unauthenticated);
}

#[tokio::test]
async fn discovery_endpoints_override_the_derived_layout() {
    let server = MockServer::start().await;
    // The provider publishes a non-Keycloak token endpoint
    let doc = json!({
        "issuer": format!("{}{}", server.uri(), REALM_PATH),
        "authorization_endpoint": format!("{}/custom/auth", server.uri()),
        "token_endpoint": format!("{}/custom/token", server.uri()),
        "userinfo_endpoint": format!("{}/custom/userinfo", server.uri()),
        "end_session_endpoint": format!("{}/custom/logout", server.uri())
    });
    Mock::given(method("GET"))
        .and(path(DISCOVERY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(doc))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/custom/token"))
        .and(body_string_contains("grant_type=password"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body("T1", "R1", 60)))
        .expect(1)
        .mount(&server)
        .await;
    let manager = manager_for(&server, false);

    manager.init(InitOptions::default()).await.unwrap();
    manager.login_with_credentials("alice", "pw").await.unwrap();
    assert_eq!(manager.get_token().await.unwrap(), "T1");
}
