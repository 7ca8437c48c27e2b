// ABOUTME: In-memory verifier store with TTL expiry, LRU eviction, and optional background cleanup
// ABOUTME: Default backend for single-instance deployments and tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

use super::{
    ConnectionAttempt, VerifierStore, VerifierStoreConfig, STATE_KEY_PREFIX, VERIFIER_KEY_PREFIX,
};
use crate::errors::{AppError, AppResult};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache entry with expiration
#[derive(Debug, Clone)]
struct Entry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory verifier store
///
/// Uses `Arc<RwLock<LruCache>>` shared between store operations and the
/// optional background cleanup task. Expired entries are also dropped
/// lazily on read, so correctness never depends on the sweep.
#[derive(Clone)]
pub struct InMemoryVerifierStore {
    store: Arc<RwLock<LruCache<String, Entry>>>,
    shutdown_tx: Option<Arc<tokio::sync::mpsc::Sender<()>>>,
}

impl InMemoryVerifierStore {
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(10_000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Create a new in-memory store from configuration
    #[must_use]
    pub fn new(config: &VerifierStoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        let store = Arc::new(RwLock::new(LruCache::new(capacity)));

        let shutdown_tx = if config.enable_background_cleanup {
            let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);
            let store_clone = store.clone();
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            Self::cleanup_expired(&store_clone).await;
                        }
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("verifier store cleanup task shutting down");
                            break;
                        }
                    }
                }
            });

            Some(Arc::new(shutdown_tx))
        } else {
            None
        };

        Self { store, shutdown_tx }
    }

    async fn cleanup_expired(store: &Arc<RwLock<LruCache<String, Entry>>>) {
        let mut guard = store.write().await;
        let expired: Vec<String> = guard
            .iter()
            .filter_map(|(k, v)| v.is_expired().then(|| k.clone()))
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        let removed = expired.len();
        drop(guard);
        if removed > 0 {
            tracing::debug!("swept {} expired verifier entries", removed);
        }
    }

    /// Read and deserialize a live entry, dropping it if expired
    async fn get_live(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let mut store = self.store.write().await;
        if let Some(entry) = store.get(key) {
            if entry.is_expired() {
                store.pop(key);
                drop(store);
                return Ok(None);
            }
            let data = entry.data.clone();
            drop(store);
            return Ok(Some(data));
        }
        drop(store);
        Ok(None)
    }
}

#[async_trait::async_trait]
impl VerifierStore for InMemoryVerifierStore {
    async fn store(&self, attempt: &ConnectionAttempt, ttl: Duration) -> AppResult<()> {
        let serialized = serde_json::to_vec(attempt)?;
        let mut store = self.store.write().await;
        store.push(
            format!("{VERIFIER_KEY_PREFIX}{}", attempt.athlete_id),
            Entry::new(serialized, ttl),
        );
        store.push(
            format!("{STATE_KEY_PREFIX}{}", attempt.state),
            Entry::new(attempt.athlete_id.clone().into_bytes(), ttl),
        );
        drop(store);
        Ok(())
    }

    async fn retrieve(&self, athlete_id: &str) -> AppResult<Option<ConnectionAttempt>> {
        let key = format!("{VERIFIER_KEY_PREFIX}{athlete_id}");
        match self.get_live(&key).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    async fn resolve_state(&self, state: &str) -> AppResult<Option<String>> {
        let key = format!("{STATE_KEY_PREFIX}{state}");
        match self.get_live(&key).await? {
            Some(data) => String::from_utf8(data)
                .map(Some)
                .map_err(|e| AppError::internal(format!("corrupt state index entry: {e}"))),
            None => Ok(None),
        }
    }

    async fn delete(&self, athlete_id: &str) -> AppResult<()> {
        // Fetch first so the state index entry can be removed with it
        let attempt = self.retrieve(athlete_id).await?;
        let mut store = self.store.write().await;
        store.pop(&format!("{VERIFIER_KEY_PREFIX}{athlete_id}"));
        if let Some(attempt) = attempt {
            store.pop(&format!("{STATE_KEY_PREFIX}{}", attempt.state));
        }
        drop(store);
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }
}

impl Drop for InMemoryVerifierStore {
    fn drop(&mut self) {
        if let Some(tx) = &self.shutdown_tx {
            if let Err(e) = tx.try_send(()) {
                tracing::debug!(error = ?e, "verifier store shutdown signal not delivered");
            }
        }
    }
}
