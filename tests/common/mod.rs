// ABOUTME: Shared test harness - stub Garmin provider and resource wiring helpers
// ABOUTME: The stub enforces PKCE by recomputing the S256 challenge from the presented verifier
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs, dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use gofast_garmin::cache::memory::InMemoryVerifierStore;
use gofast_garmin::cache::{VerifierStore, VerifierStoreConfig};
use gofast_garmin::config::ServerConfig;
use gofast_garmin::context::ServerResources;
use gofast_garmin::database::Database;
use gofast_garmin::oauth2_client::GarminOAuthConfig;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

/// The authorization code the stub provider accepts
pub const VALID_CODE: &str = "valid-code";

/// Mutable behavior knobs and request counters for the stub provider
#[derive(Default)]
pub struct StubState {
    /// When set, the token endpoint rejects verifiers whose S256 hash
    /// does not match this challenge
    pub expected_challenge: Mutex<Option<String>>,
    /// Provider user id embedded in the token response, when set
    pub token_user_id: Mutex<Option<String>>,
    /// User-info endpoint result; `None` means 404
    pub user_info_id: Mutex<Option<String>>,
    /// Profile endpoint result; `None` means 404
    pub profile_id: Mutex<Option<String>>,
    pub token_requests: AtomicUsize,
    pub user_info_requests: AtomicUsize,
    pub profile_requests: AtomicUsize,
}

impl StubState {
    pub fn set_expected_challenge(&self, challenge: &str) {
        *self.expected_challenge.lock().unwrap() = Some(challenge.to_owned());
    }

    pub fn set_token_user_id(&self, id: Option<&str>) {
        *self.token_user_id.lock().unwrap() = id.map(str::to_owned);
    }

    pub fn set_user_info_id(&self, id: Option<&str>) {
        *self.user_info_id.lock().unwrap() = id.map(str::to_owned);
    }

    pub fn set_profile_id(&self, id: Option<&str>) {
        *self.profile_id.lock().unwrap() = id.map(str::to_owned);
    }
}

/// A stub Garmin provider bound to an ephemeral local port
pub struct StubGarmin {
    pub base_url: String,
    pub state: Arc<StubState>,
}

impl StubGarmin {
    /// Start the stub server on 127.0.0.1 with an OS-assigned port
    pub async fn start() -> Self {
        let state = Arc::new(StubState::default());
        let app = Router::new()
            .route("/oauth/token", post(token_endpoint))
            .route("/user/id", get(user_info_endpoint))
            .route("/user/profile", get(profile_endpoint))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }
}

async fn token_endpoint(
    State(state): State<Arc<StubState>>,
    Form(params): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    state.token_requests.fetch_add(1, Ordering::SeqCst);

    match params.get("grant_type").map(String::as_str) {
        Some("authorization_code") => {
            if params.get("code").map(String::as_str) != Some(VALID_CODE) {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant"})),
                );
            }
            let expected = state.expected_challenge.lock().unwrap().clone();
            if let Some(expected) = expected {
                let verifier = params.get("code_verifier").cloned().unwrap_or_default();
                let mut hasher = Sha256::new();
                hasher.update(verifier.as_bytes());
                let challenge = URL_SAFE_NO_PAD.encode(hasher.finalize());
                if challenge != expected {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "invalid_grant", "detail": "pkce mismatch"})),
                    );
                }
            }
            let mut body = json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "scope": "activity_export health_export",
            });
            if let Some(id) = state.token_user_id.lock().unwrap().clone() {
                body["userId"] = Value::String(id);
            }
            (StatusCode::OK, Json(body))
        }
        Some("refresh_token") => {
            if params.get("refresh_token").map(String::as_str) != Some("rt-1") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "invalid_grant"})),
                );
            }
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": "at-2",
                    "refresh_token": "rt-2",
                    "expires_in": 3600,
                })),
            )
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        ),
    }
}

async fn user_info_endpoint(State(state): State<Arc<StubState>>) -> (StatusCode, Json<Value>) {
    state.user_info_requests.fetch_add(1, Ordering::SeqCst);
    state.user_info_id.lock().unwrap().clone().map_or(
        (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))),
        |id| (StatusCode::OK, Json(json!({"userId": id}))),
    )
}

async fn profile_endpoint(State(state): State<Arc<StubState>>) -> (StatusCode, Json<Value>) {
    state.profile_requests.fetch_add(1, Ordering::SeqCst);
    state.profile_id.lock().unwrap().clone().map_or(
        (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))),
        |id| {
            (
                StatusCode::OK,
                Json(json!({"userId": id, "displayName": "Stub Athlete"})),
            )
        },
    )
}

/// In-memory database with migrations applied
pub async fn test_database() -> Database {
    Database::new("sqlite::memory:").await.unwrap()
}

/// In-memory verifier store without the background sweep task
pub fn test_verifier_store() -> Arc<dyn VerifierStore> {
    let config = VerifierStoreConfig {
        enable_background_cleanup: false,
        ..VerifierStoreConfig::default()
    };
    Arc::new(InMemoryVerifierStore::new(&config))
}

/// Server configuration pointing every provider endpoint at the stub
pub fn test_config(stub_base_url: &str) -> ServerConfig {
    ServerConfig {
        http_port: 0,
        database_url: "sqlite::memory:".into(),
        frontend_base_url: "http://frontend.test".into(),
        verifier_ttl: Duration::from_secs(600),
        garmin: GarminOAuthConfig {
            client_id: "gofast-test".into(),
            client_secret: "test-secret".into(),
            auth_url: format!("{stub_base_url}/oauth2Confirm"),
            token_url: format!("{stub_base_url}/oauth/token"),
            api_base_url: stub_base_url.to_owned(),
            redirect_uri: "http://backend.test/api/garmin/callback".into(),
            scopes: vec!["activity_export".into(), "health_export".into()],
        },
    }
}

/// Full resource graph wired against the stub provider
pub async fn test_resources(stub: &StubGarmin) -> Arc<ServerResources> {
    let database = test_database().await;
    let config = Arc::new(test_config(&stub.base_url));
    Arc::new(ServerResources::new(
        database,
        test_verifier_store(),
        config,
    ))
}

/// Create a bare athlete row
pub async fn seed_athlete(database: &Database, id: &str) {
    database
        .create_athlete(id, None, Some("Test Athlete"), Some("athlete@gofast.run"))
        .await
        .unwrap();
}

/// Poll until `check` yields `Some`, or panic after ~2 seconds
pub async fn wait_for<T, F, Fut>(mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    for _ in 0..100 {
        if let Some(value) = check().await {
            return value;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within timeout");
}
