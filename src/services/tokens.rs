// ABOUTME: Token persistence service implementing the write-first save pipeline
// ABOUTME: Tokens land before any profile call so enrichment failures never cost a usable connection
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Token persistence.
//!
//! The save pipeline is ordered so the token write happens before any
//! provider profile call: a connection with tokens but no provider user
//! id is degraded (webhooks cannot be correlated yet), while a profile
//! with no tokens is useless. Enrichment failures are logged and
//! swallowed; only the token write itself is fatal.

use std::sync::Arc;

use crate::database::{Database, GarminTokenUpdate};
use crate::errors::AppResult;
use crate::models::GarminPermissions;
use crate::oauth2_client::{GarminOAuthClient, GarminTokenResponse};
use crate::services::WebhookService;
use serde_json::Value;
use tracing::{error, info, warn};

/// Result of one save pipeline run
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    /// Provider user id recorded on the athlete row, when enrichment
    /// succeeded on any path
    pub garmin_user_id: Option<String>,
    /// Dead letters replayed once the id became known
    pub replayed: usize,
}

/// Persists exchanged tokens and enriches the record with provider identity
#[derive(Clone)]
pub struct TokenPersistenceService {
    database: Database,
    oauth: Arc<GarminOAuthClient>,
    webhooks: WebhookService,
}

impl TokenPersistenceService {
    /// Create the service from its collaborators
    #[must_use]
    pub const fn new(
        database: Database,
        oauth: Arc<GarminOAuthClient>,
        webhooks: WebhookService,
    ) -> Self {
        Self {
            database,
            oauth,
            webhooks,
        }
    }

    /// Persist a token response for an athlete
    ///
    /// Pipeline order:
    /// 1. write the token fields, clearing any prior provider identity
    ///    (fatal on failure),
    /// 2. fetch user info and record the provider user id and profile,
    /// 3. if the token response carried no user id and step 2 yielded
    ///    none, fall back to the full profile endpoint,
    /// 4. read the row back and verify the id landed; a missing id after
    ///    all paths is logged at error level because webhook correlation
    ///    stays broken until the athlete reconnects.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailed` when the token write fails. Profile
    /// and user-info failures are non-fatal.
    pub async fn save(
        &self,
        athlete_id: &str,
        tokens: &GarminTokenResponse,
    ) -> AppResult<SaveOutcome> {
        let scope = tokens.scope.clone().unwrap_or_default();
        let update = GarminTokenUpdate {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_in: tokens.expires_in,
            scope: scope.clone(),
            permissions: GarminPermissions::from_scope(&scope),
        };
        self.database.save_garmin_tokens(athlete_id, &update).await?;
        info!(athlete_id = %athlete_id, "Garmin tokens persisted");

        let mut garmin_user_id = tokens.user_id.clone();

        match self.oauth.fetch_user_info(&tokens.access_token).await {
            Ok(info) => {
                let info_id = user_id_from(&info);
                if garmin_user_id.is_none() {
                    garmin_user_id.clone_from(&info_id);
                }
                self.database
                    .set_garmin_user(athlete_id, garmin_user_id.as_deref(), Some(&info))
                    .await?;
            }
            Err(e) => {
                warn!(athlete_id = %athlete_id, error = %e, "user-info fetch failed");
                if garmin_user_id.is_some() {
                    self.database
                        .set_garmin_user(athlete_id, garmin_user_id.as_deref(), None)
                        .await?;
                }
            }
        }

        // Fallback only applies when the token response itself omitted
        // the id; a user-info id recorded above makes it unnecessary.
        if tokens.user_id.is_none() && garmin_user_id.is_none() {
            match self.oauth.fetch_user_profile(&tokens.access_token).await {
                Ok(profile) => {
                    garmin_user_id = user_id_from(&profile);
                    self.database
                        .set_garmin_user(athlete_id, garmin_user_id.as_deref(), Some(&profile))
                        .await?;
                }
                Err(e) => {
                    warn!(athlete_id = %athlete_id, error = %e, "profile fallback failed");
                }
            }
        }

        let athlete = self.database.get_athlete_required(athlete_id).await?;
        let recorded_id = athlete.garmin_user_id().map(str::to_owned);
        if recorded_id.is_none() {
            error!(
                athlete_id = %athlete_id,
                "no provider user id after save; webhooks cannot be matched to this athlete"
            );
        }

        let mut replayed = 0;
        if let Some(id) = &recorded_id {
            replayed = self.webhooks.replay_dead_letters(id).await?;
        }

        Ok(SaveOutcome {
            garmin_user_id: recorded_id,
            replayed,
        })
    }

    /// Refresh the athlete's token pair in place
    ///
    /// Writes only the access token, refresh token and expiry; connection
    /// metadata and provider identity are owned by the save pipeline.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when the athlete has no token record,
    /// `ExchangeFailed` when the provider rejects the refresh, and
    /// `PersistenceFailed` when the write fails.
    pub async fn refresh(&self, athlete_id: &str) -> AppResult<()> {
        let athlete = self.database.get_athlete_required(athlete_id).await?;
        let record = athlete.garmin.as_ref().ok_or_else(|| {
            crate::errors::AppError::not_found(format!("Garmin connection for athlete {athlete_id}"))
        })?;

        let tokens = self
            .oauth
            .refresh_access_token(&record.refresh_token)
            .await?;
        self.database
            .update_garmin_token_pair(
                athlete_id,
                &tokens.access_token,
                &tokens.refresh_token,
                tokens.expires_in,
            )
            .await?;
        info!(athlete_id = %athlete_id, "Garmin tokens refreshed");
        Ok(())
    }

    /// Soft-disconnect the athlete's Garmin connection
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown athlete or a database error.
    pub async fn disconnect(&self, athlete_id: &str) -> AppResult<()> {
        self.database.get_athlete_required(athlete_id).await?;
        self.database.disconnect_garmin(athlete_id).await?;
        info!(athlete_id = %athlete_id, "Garmin connection disconnected");
        Ok(())
    }
}

/// Extract a provider user id from a user-info or profile document
fn user_id_from(document: &Value) -> Option<String> {
    for key in ["userId", "id", "garminUserId"] {
        match document.get(key) {
            Some(Value::String(s)) if !s.is_empty() => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_id_extraction_covers_provider_shapes() {
        assert_eq!(
            user_id_from(&json!({"userId": "abc-123"})).as_deref(),
            Some("abc-123")
        );
        assert_eq!(user_id_from(&json!({"id": 42})).as_deref(), Some("42"));
        assert_eq!(user_id_from(&json!({"userId": ""})), None);
        assert_eq!(user_id_from(&json!({"displayName": "x"})), None);
    }
}
