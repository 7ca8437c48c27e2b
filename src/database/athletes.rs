// ABOUTME: Athlete table operations including Garmin token record reads and writes
// ABOUTME: Token writes are field-level partial updates so concurrent writers cannot clobber each other
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use super::Database;
use crate::errors::{AppError, AppResult};
use crate::models::{Athlete, GarminPermissions, GarminTokenRecord};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Token fields written together after a successful exchange
///
/// Each writer owns a field set: the connect flow writes these, the refresh
/// flow writes only the token pair, webhook ingestion touches only
/// `garmin_last_sync_at`. Keeping the sets disjoint avoids last-writer-wins
/// loss on fields a given writer does not own.
#[derive(Debug, Clone)]
pub struct GarminTokenUpdate {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Raw scope string
    pub scope: String,
    /// Permission snapshot derived from the scope
    pub permissions: GarminPermissions,
}

impl Database {
    pub(super) async fn migrate_athletes(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS athletes (
                id TEXT PRIMARY KEY,
                firebase_uid TEXT,
                display_name TEXT,
                email TEXT,
                garmin_access_token TEXT,
                garmin_refresh_token TEXT,
                garmin_expires_in INTEGER,
                garmin_scope TEXT,
                garmin_connected_at DATETIME,
                garmin_last_sync_at DATETIME,
                garmin_is_connected BOOLEAN NOT NULL DEFAULT 0,
                garmin_disconnected_at DATETIME,
                garmin_permissions TEXT,
                garmin_user_id TEXT,
                garmin_user_profile TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_athletes_garmin_user ON athletes(garmin_user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Create an athlete row
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails (including duplicate id).
    pub async fn create_athlete(
        &self,
        id: &str,
        firebase_uid: Option<&str>,
        display_name: Option<&str>,
        email: Option<&str>,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO athletes (id, firebase_uid, display_name, email, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id)
        .bind(firebase_uid)
        .bind(display_name)
        .bind(email)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch an athlete by internal id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_athlete(&self, id: &str) -> AppResult<Option<Athlete>> {
        let row = sqlx::query("SELECT * FROM athletes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| athlete_from_row(&r)).transpose()
    }

    /// Fetch an athlete by internal id, failing when absent
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no athlete has this id.
    pub async fn get_athlete_required(&self, id: &str) -> AppResult<Athlete> {
        self.get_athlete(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("athlete {id}")))
    }

    /// Fetch the athlete whose token record carries this provider user id
    ///
    /// This is the lookup webhook ingestion depends on; it only returns a
    /// result after the Token Persistence Service has recorded the id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_athlete_by_garmin_user_id(
        &self,
        garmin_user_id: &str,
    ) -> AppResult<Option<Athlete>> {
        let row = sqlx::query("SELECT * FROM athletes WHERE garmin_user_id = $1")
            .bind(garmin_user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| athlete_from_row(&r)).transpose()
    }

    /// Write the token fields after a successful exchange
    ///
    /// Overwrites any prior token pair and re-activates the connection.
    /// The provider user id and profile are reset to NULL here: they
    /// belong to the new token pair, and a prior value could point at a
    /// different Garmin account. Enrichment re-records them afterwards,
    /// so a profile-fetch failure leaves them empty rather than stale.
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailed` if the update fails or matches no row.
    pub async fn save_garmin_tokens(
        &self,
        athlete_id: &str,
        update: &GarminTokenUpdate,
    ) -> AppResult<()> {
        let now = Utc::now();
        let permissions = serde_json::to_string(&update.permissions)?;

        let result = sqlx::query(
            r"
            UPDATE athletes SET
                garmin_access_token = $1,
                garmin_refresh_token = $2,
                garmin_expires_in = $3,
                garmin_scope = $4,
                garmin_permissions = $5,
                garmin_connected_at = $6,
                garmin_last_sync_at = $6,
                garmin_is_connected = 1,
                garmin_disconnected_at = NULL,
                garmin_user_id = NULL,
                garmin_user_profile = NULL
            WHERE id = $7
            ",
        )
        .bind(&update.access_token)
        .bind(&update.refresh_token)
        .bind(update.expires_in)
        .bind(&update.scope)
        .bind(permissions)
        .bind(now)
        .bind(athlete_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::persistence(format!(
                "token save matched no athlete row for {athlete_id}"
            )));
        }
        Ok(())
    }

    /// Update only the token pair after a refresh
    ///
    /// # Errors
    ///
    /// Returns `PersistenceFailed` if the update fails or matches no row.
    pub async fn update_garmin_token_pair(
        &self,
        athlete_id: &str,
        access_token: &str,
        refresh_token: &str,
        expires_in: i64,
    ) -> AppResult<()> {
        let result = sqlx::query(
            r"
            UPDATE athletes SET
                garmin_access_token = $1,
                garmin_refresh_token = $2,
                garmin_expires_in = $3
            WHERE id = $4
            ",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(expires_in)
        .bind(athlete_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::persistence(format!(
                "token refresh matched no athlete row for {athlete_id}"
            )));
        }
        Ok(())
    }

    /// Record the provider user id and optional profile blob
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_garmin_user(
        &self,
        athlete_id: &str,
        garmin_user_id: Option<&str>,
        user_profile: Option<&serde_json::Value>,
    ) -> AppResult<()> {
        let profile_json = user_profile.map(serde_json::to_string).transpose()?;

        sqlx::query(
            r"
            UPDATE athletes SET
                garmin_user_id = COALESCE($1, garmin_user_id),
                garmin_user_profile = COALESCE($2, garmin_user_profile)
            WHERE id = $3
            ",
        )
        .bind(garmin_user_id)
        .bind(profile_json)
        .bind(athlete_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Touch the last-sync timestamp after webhook-driven ingestion
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn touch_garmin_last_sync(&self, athlete_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE athletes SET garmin_last_sync_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(athlete_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-disconnect the athlete's Garmin connection
    ///
    /// Tokens remain in place until the next connect overwrites them.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn disconnect_garmin(&self, athlete_id: &str) -> AppResult<()> {
        sqlx::query(
            r"
            UPDATE athletes SET
                garmin_is_connected = 0,
                garmin_disconnected_at = $1
            WHERE id = $2
            ",
        )
        .bind(Utc::now())
        .bind(athlete_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Map an athletes row into the domain model
fn athlete_from_row(row: &SqliteRow) -> AppResult<Athlete> {
    let access_token: Option<String> = row.try_get("garmin_access_token")?;

    let garmin = match access_token {
        Some(access_token) => {
            let permissions: Option<String> = row.try_get("garmin_permissions")?;
            let user_profile: Option<String> = row.try_get("garmin_user_profile")?;

            Some(GarminTokenRecord {
                access_token,
                refresh_token: row
                    .try_get::<Option<String>, _>("garmin_refresh_token")?
                    .unwrap_or_default(),
                expires_in: row
                    .try_get::<Option<i64>, _>("garmin_expires_in")?
                    .unwrap_or_default(),
                scope: row
                    .try_get::<Option<String>, _>("garmin_scope")?
                    .unwrap_or_default(),
                connected_at: row
                    .try_get::<Option<DateTime<Utc>>, _>("garmin_connected_at")?
                    .unwrap_or_else(Utc::now),
                last_sync_at: row.try_get("garmin_last_sync_at")?,
                is_connected: row.try_get("garmin_is_connected")?,
                disconnected_at: row.try_get("garmin_disconnected_at")?,
                permissions: permissions
                    .map(|p| serde_json::from_str(&p))
                    .transpose()?,
                garmin_user_id: row.try_get("garmin_user_id")?,
                user_profile: user_profile
                    .map(|p| serde_json::from_str(&p))
                    .transpose()?,
            })
        }
        None => None,
    };

    Ok(Athlete {
        id: row.try_get("id")?,
        firebase_uid: row.try_get("firebase_uid")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        garmin,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")?
            .unwrap_or_else(Utc::now),
    })
}
