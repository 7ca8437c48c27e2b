// ABOUTME: Dead-letter table for webhook payloads that arrived before their athlete mapping existed
// ABOUTME: Entries are replayed once the matching token record gains a provider user id
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use super::Database;
use crate::errors::AppResult;
use crate::models::DeadLetter;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_dead_letters(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS garmin_webhook_dead_letters (
                id TEXT PRIMARY KEY,
                garmin_user_id TEXT,
                summary_id TEXT,
                payload TEXT NOT NULL,
                received_at DATETIME NOT NULL,
                replayed_at DATETIME
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_dead_letters_user ON garmin_webhook_dead_letters(garmin_user_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Store an unmatched webhook payload for later replay
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert_dead_letter(
        &self,
        garmin_user_id: Option<&str>,
        summary_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> AppResult<String> {
        let id = Uuid::new_v4().to_string();
        sqlx::query(
            r"
            INSERT INTO garmin_webhook_dead_letters
                (id, garmin_user_id, summary_id, payload, received_at)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(&id)
        .bind(garmin_user_id)
        .bind(summary_id)
        .bind(serde_json::to_string(payload)?)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(id)
    }

    /// Pending (not yet replayed) dead letters for a provider user id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn pending_dead_letters(
        &self,
        garmin_user_id: &str,
    ) -> AppResult<Vec<DeadLetter>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM garmin_webhook_dead_letters
            WHERE garmin_user_id = $1 AND replayed_at IS NULL
            ORDER BY received_at ASC
            ",
        )
        .bind(garmin_user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(dead_letter_from_row).collect()
    }

    /// Mark a dead letter as successfully replayed
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn mark_dead_letter_replayed(&self, id: &str) -> AppResult<()> {
        sqlx::query("UPDATE garmin_webhook_dead_letters SET replayed_at = $1 WHERE id = $2")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn dead_letter_from_row(row: &SqliteRow) -> AppResult<DeadLetter> {
    let payload: String = row.try_get("payload")?;
    Ok(DeadLetter {
        id: row.try_get("id")?,
        garmin_user_id: row.try_get("garmin_user_id")?,
        summary_id: row.try_get("summary_id")?,
        payload: serde_json::from_str(&payload)?,
        received_at: row
            .try_get::<Option<DateTime<Utc>>, _>("received_at")?
            .unwrap_or_else(Utc::now),
        replayed_at: row.try_get("replayed_at")?,
    })
}
