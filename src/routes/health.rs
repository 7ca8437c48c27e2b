// ABOUTME: Liveness and readiness endpoints for deployment probes
// ABOUTME: Readiness checks the database pool and the verifier store backend
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use std::sync::Arc;

use crate::context::ServerResources;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::warn;

/// Health routes mounted at the server root
pub fn router() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
}

/// `GET /health` - process is up
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /ready` - dependencies are reachable
async fn ready(State(resources): State<Arc<ServerResources>>) -> (StatusCode, Json<Value>) {
    let database_ok = match resources.database.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "database readiness check failed");
            false
        }
    };
    let verifiers_ok = match resources.verifiers.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "verifier store readiness check failed");
            false
        }
    };

    let status = if database_ok && verifiers_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "database": database_ok,
            "verifierStore": verifiers_ok,
        })),
    )
}
