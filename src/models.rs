// ABOUTME: Core domain models for athletes, Garmin token records, and ingested activities
// ABOUTME: Includes scope-derived permission snapshots and webhook dead-letter entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Domain models shared across the database layer, services, and routes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Permission snapshot derived from the OAuth scope string at connect time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarminPermissions {
    /// Whether any read scope was granted
    pub read: bool,
    /// Whether any write scope was granted
    pub write: bool,
    /// Raw scope string as returned by the provider
    pub scope: String,
    /// When the grant was recorded
    pub granted_at: DateTime<Utc>,
    /// Last time the grant was re-examined
    pub last_checked: DateTime<Utc>,
}

impl GarminPermissions {
    /// Derive a permission snapshot from the provider's scope string
    #[must_use]
    pub fn from_scope(scope: &str) -> Self {
        let lowered = scope.to_lowercase();
        let now = Utc::now();
        Self {
            // Garmin Connect scopes are activity/health "export" grants; any
            // non-empty scope implies read access to the granted data sets.
            read: !lowered.is_empty(),
            write: lowered.contains("write") || lowered.contains("import"),
            scope: scope.to_owned(),
            granted_at: now,
            last_checked: now,
        }
    }
}

/// Persisted Garmin connection state for one athlete
///
/// This is the single source of truth used to authenticate provider API
/// calls on the athlete's behalf. Tokens are overwritten on reconnect and
/// refresh; disconnection is soft (`is_connected=false` plus a timestamp),
/// tokens remain until the next overwrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarminTokenRecord {
    /// Bearer token for provider API calls
    pub access_token: String,
    /// Token used to obtain a fresh access token
    pub refresh_token: String,
    /// Access token lifetime in seconds, as reported by the provider
    pub expires_in: i64,
    /// Raw scope string
    pub scope: String,
    /// When the athlete first connected (this token pair)
    pub connected_at: DateTime<Utc>,
    /// Last time provider data was synced for this athlete
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Whether the connection is currently active
    pub is_connected: bool,
    /// Set when the athlete disconnects; cleared on reconnect
    pub disconnected_at: Option<DateTime<Utc>>,
    /// Permission snapshot derived from the scope string
    pub permissions: Option<GarminPermissions>,
    /// Provider-side user id used to correlate webhook payloads
    pub garmin_user_id: Option<String>,
    /// Raw profile blob fetched from the provider
    pub user_profile: Option<serde_json::Value>,
}

/// Athlete row as read from the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Athlete {
    /// Internal athlete id
    pub id: String,
    /// Externally-issued identity id (Firebase uid)
    pub firebase_uid: Option<String>,
    /// Display name
    pub display_name: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Garmin connection state, when the athlete has ever connected
    pub garmin: Option<GarminTokenRecord>,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Athlete {
    /// Provider user id recorded for webhook correlation, if any
    #[must_use]
    pub fn garmin_user_id(&self) -> Option<&str> {
        self.garmin.as_ref()?.garmin_user_id.as_deref()
    }

    /// Whether the athlete currently has an active Garmin connection
    #[must_use]
    pub fn garmin_connected(&self) -> bool {
        self.garmin.as_ref().is_some_and(|g| g.is_connected)
    }
}

/// Activity ingested from a provider webhook push
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Internal activity id
    pub id: String,
    /// Owning athlete id
    pub athlete_id: String,
    /// Provider-assigned summary id, unique per activity
    pub summary_id: String,
    /// Accumulated payload data (summary merged with detail pushes)
    pub payload: serde_json::Value,
    /// Last time a detail push was merged into this record
    pub last_hydrated_at: Option<DateTime<Utc>>,
    /// Row creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Webhook payload that could not be matched when it arrived
///
/// Stored keyed by the raw provider identifiers so it can be replayed once
/// the matching token record is enriched with that provider user id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Internal dead-letter id
    pub id: String,
    /// Provider user id referenced by the payload, if present
    pub garmin_user_id: Option<String>,
    /// Provider summary id referenced by the payload, if present
    pub summary_id: Option<String>,
    /// Raw payload as received
    pub payload: serde_json::Value,
    /// When the payload was received
    pub received_at: DateTime<Utc>,
    /// Set once the payload has been successfully replayed
    pub replayed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permissions_derived_from_scope() {
        let perms = GarminPermissions::from_scope("activity_export health_export");
        assert!(perms.read);
        assert!(!perms.write);
        assert_eq!(perms.scope, "activity_export health_export");
    }

    #[test]
    fn write_scope_detected() {
        let perms = GarminPermissions::from_scope("activity_export workout_import");
        assert!(perms.read);
        assert!(perms.write);
    }

    #[test]
    fn empty_scope_grants_nothing() {
        let perms = GarminPermissions::from_scope("");
        assert!(!perms.read);
        assert!(!perms.write);
    }
}
