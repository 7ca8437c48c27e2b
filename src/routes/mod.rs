// ABOUTME: HTTP route modules and top-level router assembly
// ABOUTME: Garmin connect flow, webhook ingestion, and health endpoints
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! HTTP routes.
//!
//! Handlers stay thin: parameter extraction, a service call, response
//! shaping. All state arrives through [`ServerResources`] in axum's
//! `State` extractor.

pub mod garmin;
pub mod health;
pub mod webhooks;

use crate::context::ServerResources;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Assemble the full application router
#[must_use]
pub fn create_router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .merge(health::router())
        .nest(
            "/api/garmin",
            garmin::router().merge(webhooks::router()),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(resources)
}
