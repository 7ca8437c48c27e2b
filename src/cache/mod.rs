// ABOUTME: Verifier store abstraction holding PKCE state between auth-URL generation and callback
// ABOUTME: Pluggable backends (in-memory, Redis) behind an object-safe trait for DI and testing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Short-TTL verifier store for in-flight Garmin connection attempts.
//!
//! Each connection attempt lives in exactly one slot keyed by athlete id;
//! storing a second attempt for the same athlete overwrites the first
//! (last request wins). A companion state index maps the random OAuth
//! `state` token back to the athlete id for the browser-redirect callback.
//! Entries expire on their own after the configured TTL - an expired or
//! missing entry means the athlete must restart the connect flow.

/// Backend selection factory
pub mod factory;
/// In-memory backend with TTL and LRU eviction
pub mod memory;
/// Redis backend for multi-instance deployments
pub mod redis;

use crate::errors::AppResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Namespace prefix for attempt entries
pub(crate) const VERIFIER_KEY_PREFIX: &str = "garmin:verifier:";
/// Namespace prefix for state-to-athlete index entries
pub(crate) const STATE_KEY_PREFIX: &str = "garmin:state:";

/// One in-flight connection attempt
///
/// Owned solely by the flow that created it; consumed and deleted once the
/// callback successfully exchanges a code, or dropped by TTL expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttempt {
    /// Athlete starting the connect flow
    pub athlete_id: String,
    /// PKCE code verifier to present at the token exchange
    pub code_verifier: String,
    /// Random state token embedded in the authorize URL
    pub state: String,
    /// When the attempt was created
    pub created_at: DateTime<Utc>,
}

impl ConnectionAttempt {
    /// Create a new attempt stamped with the current time
    #[must_use]
    pub fn new(athlete_id: String, code_verifier: String, state: String) -> Self {
        Self {
            athlete_id,
            code_verifier,
            state,
            created_at: Utc::now(),
        }
    }
}

/// Pluggable store for in-flight connection attempts
///
/// Implementations must provide automatic expiry: `retrieve` after the TTL
/// has elapsed returns `None` without any explicit sweep call. A second
/// `store` for the same athlete replaces the first entry.
#[async_trait::async_trait]
pub trait VerifierStore: Send + Sync {
    /// Persist an attempt for at most `ttl`, overwriting any live attempt
    /// for the same athlete
    async fn store(&self, attempt: &ConnectionAttempt, ttl: Duration) -> AppResult<()>;

    /// Fetch the live attempt for an athlete, or `None` when missing/expired
    async fn retrieve(&self, athlete_id: &str) -> AppResult<Option<ConnectionAttempt>>;

    /// Resolve a state token back to the athlete id that issued it
    async fn resolve_state(&self, state: &str) -> AppResult<Option<String>>;

    /// Remove an attempt (and its state index entry) once consumed
    async fn delete(&self, athlete_id: &str) -> AppResult<()>;

    /// Verify the backing store is reachable
    async fn health_check(&self) -> AppResult<()>;
}

/// Verifier store configuration
#[derive(Debug, Clone)]
pub struct VerifierStoreConfig {
    /// Maximum number of entries (in-memory backend)
    pub max_entries: usize,
    /// Redis connection URL; selects the Redis backend when set
    pub redis_url: Option<String>,
    /// Sweep interval for the in-memory backend's background cleanup
    pub cleanup_interval: Duration,
    /// Enable the background cleanup task (disable in tests)
    pub enable_background_cleanup: bool,
}

impl Default for VerifierStoreConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            redis_url: None,
            cleanup_interval: Duration::from_secs(60),
            enable_background_cleanup: true,
        }
    }
}
