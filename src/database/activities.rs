// ABOUTME: Activity table operations for webhook-ingested Garmin activities
// ABOUTME: Activities are keyed by provider summary id and hydrated by later detail pushes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use super::Database;
use crate::errors::AppResult;
use crate::models::ActivityRecord;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_activities(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS activities (
                id TEXT PRIMARY KEY,
                athlete_id TEXT NOT NULL,
                summary_id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                last_hydrated_at DATETIME,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_activities_athlete ON activities(athlete_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an activity from a webhook push
    ///
    /// A repeated push for the same `summary_id` is ignored; the provider
    /// retries deliveries and duplicates are expected.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_activity(
        &self,
        athlete_id: &str,
        summary_id: &str,
        payload: &serde_json::Value,
    ) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO activities (id, athlete_id, summary_id, payload, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (summary_id) DO NOTHING
            ",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(athlete_id)
        .bind(summary_id)
        .bind(serde_json::to_string(payload)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch an activity by provider summary id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get_activity_by_summary_id(
        &self,
        summary_id: &str,
    ) -> AppResult<Option<ActivityRecord>> {
        let row = sqlx::query("SELECT * FROM activities WHERE summary_id = $1")
            .bind(summary_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| activity_from_row(&r)).transpose()
    }

    /// List activities owned by an athlete, newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn list_activities(&self, athlete_id: &str) -> AppResult<Vec<ActivityRecord>> {
        let rows =
            sqlx::query("SELECT * FROM activities WHERE athlete_id = $1 ORDER BY created_at DESC")
                .bind(athlete_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(activity_from_row).collect()
    }

    /// Replace the payload and stamp the hydration time for an activity
    ///
    /// Returns `false` when no activity matches the summary id, so the
    /// caller can route the payload to the dead-letter store instead.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn hydrate_activity(
        &self,
        summary_id: &str,
        payload: &serde_json::Value,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r"
            UPDATE activities SET
                payload = $1,
                last_hydrated_at = $2
            WHERE summary_id = $3
            ",
        )
        .bind(serde_json::to_string(payload)?)
        .bind(Utc::now())
        .bind(summary_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn activity_from_row(row: &SqliteRow) -> AppResult<ActivityRecord> {
    let payload: String = row.try_get("payload")?;
    Ok(ActivityRecord {
        id: row.try_get("id")?,
        athlete_id: row.try_get("athlete_id")?,
        summary_id: row.try_get("summary_id")?,
        payload: serde_json::from_str(&payload)?,
        last_hydrated_at: row.try_get("last_hydrated_at")?,
        created_at: row
            .try_get::<Option<DateTime<Utc>>, _>("created_at")?
            .unwrap_or_else(Utc::now),
    })
}
