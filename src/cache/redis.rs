// ABOUTME: Redis-backed verifier store with connection pooling and native TTL expiry
// ABOUTME: Used in multi-instance deployments so callbacks can land on any replica
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use super::{
    ConnectionAttempt, VerifierStore, VerifierStoreConfig, STATE_KEY_PREFIX, VERIFIER_KEY_PREFIX,
};
use crate::errors::{AppError, AppResult};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{info, warn};

/// Number of initial connection attempts before giving up
const CONNECT_RETRIES: u32 = 3;
/// Initial retry delay; doubles per attempt up to `MAX_RETRY_DELAY_MS`
const INITIAL_RETRY_DELAY_MS: u64 = 500;
const MAX_RETRY_DELAY_MS: u64 = 5_000;

/// Redis verifier store
///
/// Relies on Redis `SET ... EX` for expiry, so overwrite-on-store and TTL
/// semantics come directly from the backend. `ConnectionManager` handles
/// reconnection transparently.
#[derive(Clone)]
pub struct RedisVerifierStore {
    manager: ConnectionManager,
}

impl RedisVerifierStore {
    /// Connect to Redis using the URL in `config`
    ///
    /// # Errors
    ///
    /// Returns an error when no URL is configured or the connection cannot
    /// be established after retries.
    pub async fn new(config: &VerifierStoreConfig) -> AppResult<Self> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| AppError::config("Redis URL is required for the Redis backend"))?;

        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| AppError::internal(format!("failed to create Redis client: {e}")))?;

        let manager = Self::connect_with_retry(&client).await?;
        info!("verifier store connected to Redis");
        Ok(Self { manager })
    }

    async fn connect_with_retry(client: &redis::Client) -> AppResult<ConnectionManager> {
        let mut delay_ms = INITIAL_RETRY_DELAY_MS;
        let mut last_error = None;

        for attempt in 0..=CONNECT_RETRIES {
            match ConnectionManager::new(client.clone()).await {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("Redis connection established after {} retries", attempt);
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < CONNECT_RETRIES {
                        warn!(
                            "Redis connection attempt {}/{} failed, retrying in {}ms",
                            attempt + 1,
                            CONNECT_RETRIES + 1,
                            delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(MAX_RETRY_DELAY_MS);
                    }
                }
            }
        }

        Err(AppError::internal(format!(
            "failed to connect to Redis after {} attempts: {}",
            CONNECT_RETRIES + 1,
            last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
        )))
    }

    fn ttl_secs(ttl: Duration) -> u64 {
        ttl.as_secs().max(1)
    }
}

#[async_trait::async_trait]
impl VerifierStore for RedisVerifierStore {
    async fn store(&self, attempt: &ConnectionAttempt, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let serialized = serde_json::to_string(attempt)?;
        let secs = Self::ttl_secs(ttl);

        let _: () = conn
            .set_ex(
                format!("{VERIFIER_KEY_PREFIX}{}", attempt.athlete_id),
                serialized,
                secs,
            )
            .await
            .map_err(|e| AppError::internal(format!("Redis SET failed: {e}")))?;

        let _: () = conn
            .set_ex(
                format!("{STATE_KEY_PREFIX}{}", attempt.state),
                attempt.athlete_id.as_str(),
                secs,
            )
            .await
            .map_err(|e| AppError::internal(format!("Redis SET failed: {e}")))?;

        Ok(())
    }

    async fn retrieve(&self, athlete_id: &str) -> AppResult<Option<ConnectionAttempt>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(format!("{VERIFIER_KEY_PREFIX}{athlete_id}"))
            .await
            .map_err(|e| AppError::internal(format!("Redis GET failed: {e}")))?;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn resolve_state(&self, state: &str) -> AppResult<Option<String>> {
        let mut conn = self.manager.clone();
        conn.get(format!("{STATE_KEY_PREFIX}{state}"))
            .await
            .map_err(|e| AppError::internal(format!("Redis GET failed: {e}")))
    }

    async fn delete(&self, athlete_id: &str) -> AppResult<()> {
        let attempt = self.retrieve(athlete_id).await?;
        let mut conn = self.manager.clone();

        let _: () = conn
            .del(format!("{VERIFIER_KEY_PREFIX}{athlete_id}"))
            .await
            .map_err(|e| AppError::internal(format!("Redis DEL failed: {e}")))?;

        if let Some(attempt) = attempt {
            let _: () = conn
                .del(format!("{STATE_KEY_PREFIX}{}", attempt.state))
                .await
                .map_err(|e| AppError::internal(format!("Redis DEL failed: {e}")))?;
        }

        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Redis health check failed: {e}")))
    }
}
