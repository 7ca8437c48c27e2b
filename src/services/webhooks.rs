// ABOUTME: Webhook ingestion service for Garmin activity push and detail notifications
// ABOUTME: Matches payloads to athletes by provider user id and dead-letters what cannot be matched
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Webhook ingestion.
//!
//! The HTTP layer acknowledges every delivery with 200 before calling
//! into this service, so nothing here can influence the provider's
//! retry behavior. Payloads that cannot be matched to an athlete land
//! in the dead-letter store and are replayed once the matching token
//! record gains a provider user id.

use crate::database::Database;
use crate::errors::{AppResult, ErrorCode};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Counters describing what one webhook delivery turned into
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestOutcome {
    /// Items stored or hydrated against a matched athlete
    pub processed: usize,
    /// Items parked in the dead-letter store
    pub dead_lettered: usize,
}

/// Processes webhook payloads against the activity and athlete tables
#[derive(Clone)]
pub struct WebhookService {
    database: Database,
}

impl WebhookService {
    /// Create the service around a database handle
    #[must_use]
    pub const fn new(database: Database) -> Self {
        Self { database }
    }

    /// Ingest an activity push notification
    ///
    /// Each item is matched to an athlete by `userId`. Matched items are
    /// inserted (duplicates by `summaryId` are ignored) and the athlete's
    /// last-sync timestamp is touched. Unmatched items are dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns an error only when the database itself fails; unmatched
    /// payloads are not errors.
    pub async fn process_activity_push(&self, payload: &Value) -> AppResult<IngestOutcome> {
        let items = extract_items(payload, "activities");
        let mut outcome = IngestOutcome::default();

        for item in items {
            let garmin_user_id = string_field(item, "userId");
            let summary_id = string_field(item, "summaryId");

            let athlete = match &garmin_user_id {
                Some(user_id) => self.database.get_athlete_by_garmin_user_id(user_id).await?,
                None => None,
            };

            match (athlete, &summary_id) {
                (Some(athlete), Some(summary_id)) => {
                    self.database
                        .create_activity(&athlete.id, summary_id, item)
                        .await?;
                    self.database.touch_garmin_last_sync(&athlete.id).await?;
                    debug!(
                        athlete_id = %athlete.id,
                        summary_id = %summary_id,
                        "stored webhook activity"
                    );
                    outcome.processed += 1;
                }
                _ => {
                    warn!(
                        code = ?ErrorCode::WebhookUnmatched,
                        garmin_user_id = garmin_user_id.as_deref().unwrap_or("<missing>"),
                        summary_id = summary_id.as_deref().unwrap_or("<missing>"),
                        "activity push did not match an athlete, dead-lettering"
                    );
                    self.database
                        .insert_dead_letter(
                            garmin_user_id.as_deref(),
                            summary_id.as_deref(),
                            item,
                        )
                        .await?;
                    outcome.dead_lettered += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Ingest an activity-details notification
    ///
    /// Detail items hydrate an existing activity row matched by
    /// `summaryId`; the stored payload is merged with the detail fields.
    /// Details arriving before their activity (or before the athlete is
    /// known) are dead-lettered.
    ///
    /// # Errors
    ///
    /// Returns an error only when the database itself fails.
    pub async fn process_activity_details(&self, payload: &Value) -> AppResult<IngestOutcome> {
        let items = extract_items(payload, "activityDetails");
        let mut outcome = IngestOutcome::default();

        for item in items {
            if self.hydrate_detail(item).await? {
                outcome.processed += 1;
            } else {
                let garmin_user_id = string_field(item, "userId");
                let summary_id = string_field(item, "summaryId");
                warn!(
                    code = ?ErrorCode::WebhookUnmatched,
                    garmin_user_id = garmin_user_id.as_deref().unwrap_or("<missing>"),
                    summary_id = summary_id.as_deref().unwrap_or("<missing>"),
                    "activity details did not match a stored activity, dead-lettering"
                );
                self.database
                    .insert_dead_letter(garmin_user_id.as_deref(), summary_id.as_deref(), item)
                    .await?;
                outcome.dead_lettered += 1;
            }
        }

        Ok(outcome)
    }

    /// Replay pending dead letters for a provider user id
    ///
    /// Called after token persistence records a `garmin_user_id`, when
    /// parked payloads first become matchable. Items that still do not
    /// match stay pending for a later replay.
    ///
    /// # Errors
    ///
    /// Returns an error only when the database itself fails.
    pub async fn replay_dead_letters(&self, garmin_user_id: &str) -> AppResult<usize> {
        let pending = self.database.pending_dead_letters(garmin_user_id).await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let Some(athlete) = self
            .database
            .get_athlete_by_garmin_user_id(garmin_user_id)
            .await?
        else {
            return Ok(0);
        };

        let mut replayed = 0;
        for letter in pending {
            let summary_id = letter
                .summary_id
                .clone()
                .or_else(|| string_field(&letter.payload, "summaryId"));
            let Some(summary_id) = summary_id else {
                continue;
            };

            // A detail payload replays as a hydration when its activity
            // already exists; everything else replays as a fresh insert.
            if !self.hydrate_detail(&letter.payload).await? {
                self.database
                    .create_activity(&athlete.id, &summary_id, &letter.payload)
                    .await?;
            }
            self.database.mark_dead_letter_replayed(&letter.id).await?;
            replayed += 1;
        }

        if replayed > 0 {
            self.database.touch_garmin_last_sync(&athlete.id).await?;
            info!(
                garmin_user_id = %garmin_user_id,
                replayed, "replayed dead-lettered webhook payloads"
            );
        }
        Ok(replayed)
    }

    /// Merge a detail item into its stored activity; `false` when the
    /// activity does not exist yet.
    async fn hydrate_detail(&self, item: &Value) -> AppResult<bool> {
        let Some(summary_id) = string_field(item, "summaryId") else {
            return Ok(false);
        };
        let Some(existing) = self
            .database
            .get_activity_by_summary_id(&summary_id)
            .await?
        else {
            return Ok(false);
        };

        let merged = merge_payloads(&existing.payload, item);
        self.database.hydrate_activity(&summary_id, &merged).await
    }
}

/// Pull the notification items out of a delivery body
///
/// Garmin wraps items in a named array (`activities`, `activityDetails`);
/// a bare array or a single object are accepted as well.
fn extract_items<'a>(payload: &'a Value, key: &str) -> Vec<&'a Value> {
    if let Some(items) = payload.get(key).and_then(Value::as_array) {
        return items.iter().collect();
    }
    if let Some(items) = payload.as_array() {
        return items.iter().collect();
    }
    if payload.is_object() {
        return vec![payload];
    }
    Vec::new()
}

/// Read a string field, accepting numeric ids as well
fn string_field(item: &Value, key: &str) -> Option<String> {
    match item.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Shallow-merge two payload objects, detail fields winning
fn merge_payloads(base: &Value, incoming: &Value) -> Value {
    match (base, incoming) {
        (Value::Object(base), Value::Object(incoming)) => {
            let mut merged = base.clone();
            for (k, v) in incoming {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        _ => incoming.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_items_handles_wrapped_and_bare_shapes() {
        let wrapped = json!({"activities": [{"summaryId": "a"}, {"summaryId": "b"}]});
        assert_eq!(extract_items(&wrapped, "activities").len(), 2);

        let bare = json!([{"summaryId": "a"}]);
        assert_eq!(extract_items(&bare, "activities").len(), 1);

        let single = json!({"summaryId": "a"});
        assert_eq!(extract_items(&single, "activities").len(), 1);

        assert!(extract_items(&json!("nope"), "activities").is_empty());
    }

    #[test]
    fn string_field_accepts_numbers() {
        let item = json!({"userId": 12345, "summaryId": "x-1"});
        assert_eq!(string_field(&item, "userId").as_deref(), Some("12345"));
        assert_eq!(string_field(&item, "summaryId").as_deref(), Some("x-1"));
        assert_eq!(string_field(&item, "missing"), None);
    }

    #[test]
    fn merge_prefers_incoming_fields() {
        let base = json!({"summaryId": "a", "distance": 1000, "name": "Morning Run"});
        let detail = json!({"summaryId": "a", "distance": 1024, "samples": [1, 2]});
        let merged = merge_payloads(&base, &detail);
        assert_eq!(merged["distance"], 1024);
        assert_eq!(merged["name"], "Morning Run");
        assert_eq!(merged["samples"], json!([1, 2]));
    }
}
