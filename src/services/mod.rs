// ABOUTME: Service layer sitting between the HTTP routes and the database
// ABOUTME: Token persistence and webhook ingestion, both explicitly constructed and injected
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Service layer.
//!
//! Routes stay thin; the flow logic lives here. Services own no global
//! state and receive their database handle and OAuth client at
//! construction time.

pub mod tokens;
pub mod webhooks;

pub use tokens::{SaveOutcome, TokenPersistenceService};
pub use webhooks::{IngestOutcome, WebhookService};
