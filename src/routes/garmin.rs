// ABOUTME: Garmin connect-flow routes - auth URL, OAuth callback, exchange, status, refresh, disconnect
// ABOUTME: The callback always redirects to the frontend settings page, success or not
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Garmin connect-flow routes.
//!
//! Two exchange surfaces share the same pipeline: `/callback` is the
//! browser-facing redirect target and communicates results via the
//! frontend settings URL, while `/exchange` is the JSON API used when
//! the frontend drives the exchange itself.

use std::sync::Arc;

use crate::cache::ConnectionAttempt;
use crate::context::ServerResources;
use crate::errors::{AppError, AppResult, ErrorCode};
use crate::oauth2_client::{generate_state, PkceParams};
use axum::extract::{Query, State};
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

/// Routes mounted under `/api/garmin`
pub fn router() -> Router<Arc<ServerResources>> {
    Router::new()
        .route("/auth-url", get(auth_url))
        .route("/callback", get(callback))
        .route("/exchange", get(exchange))
        .route("/status", get(status))
        .route("/refresh", post(refresh))
        .route("/disconnect", post(disconnect))
}

#[derive(Debug, Deserialize)]
struct AthleteQuery {
    #[serde(rename = "athleteId")]
    athlete_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AthleteBody {
    #[serde(rename = "athleteId")]
    athlete_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExchangeQuery {
    code: Option<String>,
    #[serde(rename = "athleteId")]
    athlete_id: Option<String>,
}

/// `GET /api/garmin/auth-url?athleteId=...`
///
/// Generates a fresh PKCE pair and state token, stores the attempt in the
/// verifier store (overwriting any live attempt for the athlete), and
/// returns the provider authorize URL.
async fn auth_url(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<AthleteQuery>,
) -> AppResult<Json<Value>> {
    let athlete_id = query
        .athlete_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::missing_parameters("athleteId is required"))?;

    let pkce = PkceParams::generate();
    let state = generate_state();
    let attempt = ConnectionAttempt::new(
        athlete_id.clone(),
        pkce.code_verifier.clone(),
        state.clone(),
    );

    resources
        .verifiers
        .store(&attempt, resources.config.verifier_ttl)
        .await?;
    let url = resources.oauth.authorization_url(&pkce, &state)?;

    info!(athlete_id = %athlete_id, "issued Garmin authorize URL");
    Ok(Json(json!({
        "authUrl": url,
        "state": state,
        "expiresInMinutes": resources.config.verifier_ttl.as_secs() / 60,
    })))
}

/// `GET /api/garmin/callback?code=...&state=...`
///
/// Browser-facing redirect target. Every outcome redirects back to the
/// frontend settings page; errors are carried as
/// `status=error&message=<code>` query parameters rather than HTTP error
/// statuses, because the user agent here is the athlete's browser.
async fn callback(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let (Some(code), Some(state)) = (
        query.code.filter(|c| !c.is_empty()),
        query.state.filter(|s| !s.is_empty()),
    ) else {
        return error_redirect(&resources, ErrorCode::MissingParameters);
    };

    match run_callback(&resources, &code, &state).await {
        Ok(athlete_id) => {
            let query = format!(
                "status=success&athleteId={}",
                urlencoding::encode(&athlete_id)
            );
            Redirect::to(&resources.config.settings_redirect(&query))
        }
        Err(e) => {
            warn!(code = ?e.code, "Garmin callback failed: {}", e.message);
            error_redirect(&resources, e.code)
        }
    }
}

/// Resolve the athlete, exchange the code, and persist tokens
async fn run_callback(
    resources: &ServerResources,
    code: &str,
    state: &str,
) -> AppResult<String> {
    // Primary resolution goes through the state index; a miss falls back
    // to reading the state parameter as an athlete id, which covers
    // integrations that pass their own identifier as state.
    let (athlete_id, via_index) = match resources.verifiers.resolve_state(state).await? {
        Some(athlete_id) => (athlete_id, true),
        None => (state.to_owned(), false),
    };

    let attempt = resources
        .verifiers
        .retrieve(&athlete_id)
        .await?
        .ok_or_else(|| AppError::verifier_expired(&athlete_id))?;

    // A stale index entry pointing at a newer attempt means this callback
    // lost the last-request-wins race.
    if via_index && attempt.state != state {
        return Err(AppError::verifier_expired(&athlete_id));
    }

    let tokens = resources
        .oauth
        .exchange_code(code, &attempt.code_verifier)
        .await?;
    resources.verifiers.delete(&athlete_id).await?;

    let outcome = resources.tokens.save(&athlete_id, &tokens).await?;
    info!(
        athlete_id = %athlete_id,
        garmin_user_id = outcome.garmin_user_id.as_deref().unwrap_or("<none>"),
        replayed = outcome.replayed,
        "Garmin connection established via callback"
    );
    Ok(athlete_id)
}

/// `GET /api/garmin/exchange?code=...&athleteId=...`
///
/// JSON twin of the callback for frontends that receive the authorization
/// code themselves and call the backend directly.
async fn exchange(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<ExchangeQuery>,
) -> AppResult<Json<Value>> {
    let (Some(code), Some(athlete_id)) = (
        query.code.filter(|c| !c.is_empty()),
        query.athlete_id.filter(|id| !id.is_empty()),
    ) else {
        return Err(AppError::missing_parameters(
            "code and athleteId are required",
        ));
    };

    let attempt = resources
        .verifiers
        .retrieve(&athlete_id)
        .await?
        .ok_or_else(|| AppError::verifier_expired(&athlete_id))?;

    let tokens = resources
        .oauth
        .exchange_code(&code, &attempt.code_verifier)
        .await?;
    resources.verifiers.delete(&athlete_id).await?;

    let outcome = resources.tokens.save(&athlete_id, &tokens).await?;
    info!(
        athlete_id = %athlete_id,
        garmin_user_id = outcome.garmin_user_id.as_deref().unwrap_or("<none>"),
        "Garmin connection established via exchange"
    );

    Ok(Json(json!({
        "success": true,
        "athleteId": athlete_id,
        "garminUserId": outcome.garmin_user_id,
        "replayedWebhooks": outcome.replayed,
    })))
}

/// `GET /api/garmin/status?athleteId=...`
async fn status(
    State(resources): State<Arc<ServerResources>>,
    Query(query): Query<AthleteQuery>,
) -> AppResult<Json<Value>> {
    let athlete_id = query
        .athlete_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::missing_parameters("athleteId is required"))?;

    let athlete = resources.database.get_athlete_required(&athlete_id).await?;
    let response = athlete.garmin.as_ref().map_or_else(
        || json!({ "connected": false }),
        |record| {
            json!({
                "connected": record.is_connected,
                "garminUserId": record.garmin_user_id,
                "connectedAt": record.connected_at,
                "lastSyncAt": record.last_sync_at,
                "disconnectedAt": record.disconnected_at,
                "permissions": record.permissions,
            })
        },
    );
    Ok(Json(response))
}

/// `POST /api/garmin/refresh` with body `{"athleteId": ...}`
async fn refresh(
    State(resources): State<Arc<ServerResources>>,
    Json(body): Json<AthleteBody>,
) -> AppResult<Json<Value>> {
    let athlete_id = body
        .athlete_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::missing_parameters("athleteId is required"))?;

    resources.tokens.refresh(&athlete_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// `POST /api/garmin/disconnect` with body `{"athleteId": ...}`
async fn disconnect(
    State(resources): State<Arc<ServerResources>>,
    Json(body): Json<AthleteBody>,
) -> AppResult<Json<Value>> {
    let athlete_id = body
        .athlete_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::missing_parameters("athleteId is required"))?;

    resources.tokens.disconnect(&athlete_id).await?;
    Ok(Json(json!({ "success": true })))
}

/// Redirect to the frontend settings page with an error code
fn error_redirect(resources: &ServerResources, code: ErrorCode) -> Redirect {
    let query = format!("status=error&message={}", code.redirect_message());
    Redirect::to(&resources.config.settings_redirect(&query))
}
