// ABOUTME: Shared resource container injected into every route via axum state
// ABOUTME: Built once at startup; replaces process-wide singletons with explicit dependencies
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Shared server resources.
//!
//! Every handler receives an `Arc<ServerResources>` through axum's
//! `State` extractor. Resources are constructed exactly once in `main`
//! and cloned by reference count, never re-created per request.

use std::sync::Arc;

use crate::cache::VerifierStore;
use crate::config::ServerConfig;
use crate::database::Database;
use crate::oauth2_client::GarminOAuthClient;
use crate::services::{TokenPersistenceService, WebhookService};

/// Container for all shared server resources
pub struct ServerResources {
    /// Database handle (cheap to clone, pool-backed)
    pub database: Database,
    /// Pending-connection verifier store
    pub verifiers: Arc<dyn VerifierStore>,
    /// Garmin OAuth client
    pub oauth: Arc<GarminOAuthClient>,
    /// Token persistence pipeline
    pub tokens: TokenPersistenceService,
    /// Webhook ingestion service
    pub webhooks: WebhookService,
    /// Server configuration
    pub config: Arc<ServerConfig>,
}

impl ServerResources {
    /// Wire up the resource graph from its leaves
    #[must_use]
    pub fn new(
        database: Database,
        verifiers: Arc<dyn VerifierStore>,
        config: Arc<ServerConfig>,
    ) -> Self {
        let oauth = Arc::new(GarminOAuthClient::new(config.garmin.clone()));
        let webhooks = WebhookService::new(database.clone());
        let tokens =
            TokenPersistenceService::new(database.clone(), oauth.clone(), webhooks.clone());

        Self {
            database,
            verifiers,
            oauth,
            tokens,
            webhooks,
            config,
        }
    }
}
