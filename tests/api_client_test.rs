// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the oidc-session project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Integration tests for the authenticated backend client
//!
//! Two mock servers: one plays the identity provider, one plays the
//! protected resource server that validates bearer tokens.

mod common;

use common::*;
use oidc_session::{ApiClient, SessionError};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn requests_carry_bearer_and_accept_headers() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_password_grant(&provider, "T1", "R1", 60).await;
    Mock::given(method("GET"))
        .and(path("/students"))
        .and(header("Authorization", "Bearer T1"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "students": ["alice"] })))
        .expect(1)
        .mount(&backend)
        .await;

    let manager = manager_for(&provider, false);
    manager.login_with_credentials("alice", "pw").await.unwrap();

    let api = ApiClient::new(backend.uri().parse().unwrap(), manager);
    let body: serde_json::Value = api.get_json("/students").await.unwrap();
    assert_eq!(body["students"][0], "alice");
}

#[tokio::test]
async fn backend_rejection_triggers_one_refresh_then_retry() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_password_grant(&provider, "T1", "R1", 60).await;
    mount_refresh_grant(&provider, "R1", "T2", "R2", 60).await;
    // The backend rejects the first token and accepts the refreshed one
    Mock::given(method("GET"))
        .and(path("/students"))
        .and(header("Authorization", "Bearer T1"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/students"))
        .and(header("Authorization", "Bearer T2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .expect(1)
        .mount(&backend)
        .await;

    let manager = manager_for(&provider, false);
    manager.login_with_credentials("alice", "pw").await.unwrap();

    let api = ApiClient::new(backend.uri().parse().unwrap(), manager);
    let response = api.get("/students").await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn a_second_rejection_surfaces_with_no_further_retries() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_password_grant(&provider, "T1", "R1", 60).await;
    mount_refresh_grant(&provider, "R1", "T2", "R2", 60).await;
    // Garbage audience: the backend rejects every token it sees
    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(401))
        .expect(2)
        .mount(&backend)
        .await;

    let manager = manager_for(&provider, false);
    manager.login_with_credentials("alice", "pw").await.unwrap();

    let api = ApiClient::new(backend.uri().parse().unwrap(), manager);
    let err = api.get("/students").await.unwrap_err();
    assert!(matches!(err, SessionError::Authentication { .. }));
    // expect(2) on the backend mock: exactly one retry, then give up
}

#[tokio::test]
async fn non_auth_error_statuses_pass_through_untouched() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;
    mount_password_grant(&provider, "T1", "R1", 60).await;
    Mock::given(method("GET"))
        .and(path("/students"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&backend)
        .await;

    let manager = manager_for(&provider, false);
    manager.login_with_credentials("alice", "pw").await.unwrap();

    let api = ApiClient::new(backend.uri().parse().unwrap(), manager);
    // A 503 is the caller's problem, not an auth rejection: no retry
    let response = api.get("/students").await.unwrap();
    assert_eq!(response.status().as_u16(), 503);
}

#[tokio::test]
async fn api_calls_without_a_session_fail_fast() {
    let provider = MockServer::start().await;
    let backend = MockServer::start().await;
    let manager = manager_for(&provider, false);

    let api = ApiClient::new(backend.uri().parse().unwrap(), manager);
    assert!(matches!(
        api.get("/students").await.unwrap_err(),
        SessionError::NotAuthenticated
    ));
}
