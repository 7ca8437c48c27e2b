// ABOUTME: End-to-end tests for the connect-flow routes against the stub provider
// ABOUTME: Drives auth-url, callback, exchange, status, refresh, and disconnect through the router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use url::Url;

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Option<String>, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let location = response
        .headers()
        .get(header::LOCATION)
        .map(|v| v.to_str().unwrap().to_owned());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, location, body)
}

async fn post_json(app: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Run the auth-url step and arm the stub with the issued challenge
async fn start_connect(app: &Router, stub: &common::StubGarmin, athlete_id: &str) -> String {
    let (status, _, body) = send(
        app,
        Method::GET,
        &format!("/api/garmin/auth-url?athleteId={athlete_id}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let authorize = Url::parse(body["authUrl"].as_str().unwrap()).unwrap();
    let challenge = authorize
        .query_pairs()
        .find(|(k, _)| k == "code_challenge")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    stub.state.set_expected_challenge(&challenge);

    body["state"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn auth_url_requires_athlete_id() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, _, body) = send(&app, Method::GET, "/api/garmin/auth-url").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_PARAMETERS");
}

#[tokio::test]
async fn auth_url_issues_a_provider_authorize_url() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources.clone());

    let (status, _, body) =
        send(&app, Method::GET, "/api/garmin/auth-url?athleteId=A1").await;
    assert_eq!(status, StatusCode::OK);

    let authorize = Url::parse(body["authUrl"].as_str().unwrap()).unwrap();
    assert!(authorize.as_str().starts_with(&stub.base_url));
    assert_eq!(body["expiresInMinutes"], 10);
    let state = body["state"].as_str().unwrap();
    assert_eq!(
        resources.verifiers.resolve_state(state).await.unwrap(),
        Some("A1".to_owned())
    );
}

#[tokio::test]
async fn callback_completes_the_connection_and_redirects_success() {
    let stub = common::StubGarmin::start().await;
    stub.state.set_token_user_id(Some("G1"));
    stub.state.set_user_info_id(None);
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources.clone());

    let state = start_connect(&app, &stub, "A1").await;

    let (status, location, _) = send(
        &app,
        Method::GET,
        &format!(
            "/api/garmin/callback?code={}&state={state}",
            common::VALID_CODE
        ),
    )
    .await;

    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location.as_deref(),
        Some("http://frontend.test/settings/garmin?status=success&athleteId=A1")
    );

    let athlete = resources.database.get_athlete("A1").await.unwrap().unwrap();
    assert!(athlete.garmin_connected());
    assert_eq!(athlete.garmin_user_id(), Some("G1"));

    // The attempt is consumed; the same state cannot be replayed
    assert!(resources.verifiers.retrieve("A1").await.unwrap().is_none());
}

#[tokio::test]
async fn callback_without_parameters_redirects_missing_parameters() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, location, _) = send(&app, Method::GET, "/api/garmin/callback").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location.as_deref(),
        Some("http://frontend.test/settings/garmin?status=error&message=missing_parameters")
    );
}

#[tokio::test]
async fn callback_with_no_stored_attempt_redirects_verifier_expired() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, location, _) =
        send(&app, Method::GET, "/api/garmin/callback?code=ABC&state=A1").await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location.as_deref(),
        Some("http://frontend.test/settings/garmin?status=error&message=code_verifier_expired")
    );
}

#[tokio::test]
async fn callback_with_rejected_code_redirects_exchange_failed() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources);

    let state = start_connect(&app, &stub, "A1").await;

    let (status, location, _) = send(
        &app,
        Method::GET,
        &format!("/api/garmin/callback?code=wrong-code&state={state}"),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location.as_deref(),
        Some("http://frontend.test/settings/garmin?status=error&message=exchange_failed")
    );
}

#[tokio::test]
async fn restarting_the_flow_invalidates_the_first_state() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources);

    let first_state = start_connect(&app, &stub, "A1").await;
    let _second_state = start_connect(&app, &stub, "A1").await;

    let (status, location, _) = send(
        &app,
        Method::GET,
        &format!(
            "/api/garmin/callback?code={}&state={first_state}",
            common::VALID_CODE
        ),
    )
    .await;
    assert_eq!(status, StatusCode::SEE_OTHER);
    assert_eq!(
        location.as_deref(),
        Some("http://frontend.test/settings/garmin?status=error&message=code_verifier_expired")
    );
}

#[tokio::test]
async fn exchange_returns_json_and_consumes_the_attempt() {
    let stub = common::StubGarmin::start().await;
    stub.state.set_token_user_id(Some("G1"));
    stub.state.set_user_info_id(None);
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources.clone());

    start_connect(&app, &stub, "A1").await;

    let (status, _, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/garmin/exchange?code={}&athleteId=A1",
            common::VALID_CODE
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["athleteId"], "A1");
    assert_eq!(body["garminUserId"], "G1");
    assert!(resources.verifiers.retrieve("A1").await.unwrap().is_none());
}

#[tokio::test]
async fn exchange_with_a_mismatched_verifier_fails_at_the_provider() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources);

    // The code was issued against the first attempt's challenge, but a
    // restarted flow replaced the stored verifier. The presented
    // verifier no longer hashes to the challenge, so the provider
    // rejects the exchange.
    start_connect(&app, &stub, "A1").await;
    let (_, _, body) = send(&app, Method::GET, "/api/garmin/auth-url?athleteId=A1").await;
    assert!(body["state"].is_string());

    let (status, _, body) = send(
        &app,
        Method::GET,
        &format!(
            "/api/garmin/exchange?code={}&athleteId=A1",
            common::VALID_CODE
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "EXCHANGE_FAILED");
    assert_eq!(stub.state.token_requests.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exchange_without_a_stored_verifier_is_a_json_error() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, _, body) = send(
        &app,
        Method::GET,
        "/api/garmin/exchange?code=ABC&athleteId=A1",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "CODE_VERIFIER_EXPIRED");
}

#[tokio::test]
async fn exchange_requires_both_parameters() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, _, body) =
        send(&app, Method::GET, "/api/garmin/exchange?code=ABC").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "MISSING_PARAMETERS");
}

#[tokio::test]
async fn status_reports_the_connection_lifecycle() {
    let stub = common::StubGarmin::start().await;
    stub.state.set_token_user_id(Some("G1"));
    stub.state.set_user_info_id(None);
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, _, body) =
        send(&app, Method::GET, "/api/garmin/status?athleteId=A1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);

    let state = start_connect(&app, &stub, "A1").await;
    send(
        &app,
        Method::GET,
        &format!(
            "/api/garmin/callback?code={}&state={state}",
            common::VALID_CODE
        ),
    )
    .await;

    let (_, _, body) = send(&app, Method::GET, "/api/garmin/status?athleteId=A1").await;
    assert_eq!(body["connected"], true);
    assert_eq!(body["garminUserId"], "G1");

    let (status, body) = post_json(
        &app,
        "/api/garmin/disconnect",
        &serde_json::json!({"athleteId": "A1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let (_, _, body) = send(&app, Method::GET, "/api/garmin/status?athleteId=A1").await;
    assert_eq!(body["connected"], false);
}

#[tokio::test]
async fn refresh_route_rotates_the_token_pair() {
    let stub = common::StubGarmin::start().await;
    stub.state.set_token_user_id(Some("G1"));
    stub.state.set_user_info_id(None);
    let resources = common::test_resources(&stub).await;
    common::seed_athlete(&resources.database, "A1").await;
    let app = gofast_garmin::routes::create_router(resources.clone());

    let state = start_connect(&app, &stub, "A1").await;
    send(
        &app,
        Method::GET,
        &format!(
            "/api/garmin/callback?code={}&state={state}",
            common::VALID_CODE
        ),
    )
    .await;

    let (status, body) = post_json(
        &app,
        "/api/garmin/refresh",
        &serde_json::json!({"athleteId": "A1"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    let athlete = resources.database.get_athlete("A1").await.unwrap().unwrap();
    assert_eq!(athlete.garmin.as_ref().unwrap().access_token, "at-2");
}

#[tokio::test]
async fn status_for_unknown_athlete_is_not_found() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, _, body) =
        send(&app, Method::GET, "/api/garmin/status?athleteId=ghost").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "RESOURCE_NOT_FOUND");
}

#[tokio::test]
async fn health_and_readiness_respond() {
    let stub = common::StubGarmin::start().await;
    let resources = common::test_resources(&stub).await;
    let app = gofast_garmin::routes::create_router(resources);

    let (status, _, body) = send(&app, Method::GET, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");

    let (status, _, body) = send(&app, Method::GET, "/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["database"], true);
    assert_eq!(body["verifierStore"], true);
}
