// ABOUTME: Garmin webhook endpoints for activity push and activity-details notifications
// ABOUTME: Always acknowledges with 200 before processing so the provider never retries on our failures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Webhook routes.
//!
//! Garmin disables endpoints that fail deliveries repeatedly, so these
//! handlers acknowledge with 200 unconditionally and hand the payload to
//! a background task. The body is taken as raw bytes; even a payload that
//! fails to parse is acknowledged, logged, and dropped.

use std::sync::Arc;

use crate::context::ServerResources;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use serde_json::Value;
use tracing::{info, warn};

/// Webhook routes mounted under `/api/garmin`
pub fn router() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/activities", post(activities))
        .route("/activity-details", post(activity_details))
}

/// `POST /api/garmin/activities`
async fn activities(
    State(resources): State<Arc<ServerResources>>,
    body: Bytes,
) -> StatusCode {
    ingest(resources, body, WebhookKind::Push)
}

/// `POST /api/garmin/activity-details`
async fn activity_details(
    State(resources): State<Arc<ServerResources>>,
    body: Bytes,
) -> StatusCode {
    ingest(resources, body, WebhookKind::Details)
}

#[derive(Debug, Clone, Copy)]
enum WebhookKind {
    Push,
    Details,
}

/// Acknowledge, then process in the background
fn ingest(resources: Arc<ServerResources>, body: Bytes, kind: WebhookKind) -> StatusCode {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(?kind, error = %e, "unparseable webhook body, acknowledged and dropped");
            return StatusCode::OK;
        }
    };

    tokio::spawn(async move {
        let result = match kind {
            WebhookKind::Push => resources.webhooks.process_activity_push(&payload).await,
            WebhookKind::Details => resources.webhooks.process_activity_details(&payload).await,
        };
        match result {
            Ok(outcome) => info!(
                ?kind,
                processed = outcome.processed,
                dead_lettered = outcome.dead_lettered,
                "webhook delivery processed"
            ),
            Err(e) => warn!(?kind, error = %e, "webhook processing failed"),
        }
    });

    StatusCode::OK
}
