// ABOUTME: Environment-driven backend selection for the verifier store
// ABOUTME: Chooses Redis when REDIS_URL is configured, in-memory otherwise
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use super::memory::InMemoryVerifierStore;
use super::redis::RedisVerifierStore;
use super::{VerifierStore, VerifierStoreConfig};
use crate::errors::AppResult;
use std::sync::Arc;
use std::time::Duration;

/// Build a verifier store from configuration
///
/// # Errors
///
/// Returns an error if the Redis backend is selected and the connection
/// cannot be established.
pub async fn build(config: &VerifierStoreConfig) -> AppResult<Arc<dyn VerifierStore>> {
    if config.redis_url.is_some() {
        tracing::info!("initializing Redis verifier store");
        let store = RedisVerifierStore::new(config).await?;
        return Ok(Arc::new(store));
    }

    tracing::info!(
        "initializing in-memory verifier store (max entries: {})",
        config.max_entries
    );
    Ok(Arc::new(InMemoryVerifierStore::new(config)))
}

/// Build a verifier store configuration from environment variables
#[must_use]
pub fn config_from_env() -> VerifierStoreConfig {
    let defaults = VerifierStoreConfig::default();
    VerifierStoreConfig {
        max_entries: std::env::var("VERIFIER_STORE_MAX_ENTRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_entries),
        redis_url: std::env::var("REDIS_URL").ok(),
        cleanup_interval: std::env::var("VERIFIER_STORE_CLEANUP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map_or(defaults.cleanup_interval, Duration::from_secs),
        enable_background_cleanup: defaults.enable_background_cleanup,
    }
}
