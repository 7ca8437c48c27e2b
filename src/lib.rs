// ABOUTME: GoFast Garmin integration service - OAuth2/PKCE connect flow and webhook ingestion
// ABOUTME: Library crate wiring config, storage, services, and HTTP routes together
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! # GoFast Garmin Integration Service
//!
//! Backend service connecting GoFast athletes to Garmin Connect:
//!
//! - **Connect flow**: OAuth2 authorization-code + PKCE. The server
//!   generates the verifier/challenge pair, parks the attempt in a
//!   short-TTL verifier store, and exchanges the authorization code
//!   server-side so the verifier never reaches the browser.
//! - **Token persistence**: exchanged tokens are written first, then the
//!   record is enriched with the provider user id that webhook
//!   correlation depends on.
//! - **Webhook ingestion**: activity push and detail notifications are
//!   acknowledged immediately and processed in the background; payloads
//!   that cannot be matched yet are dead-lettered and replayed later.
//!
//! All shared state is built once in `main` and injected through
//! [`context::ServerResources`]; there are no global singletons.

/// Short-TTL verifier store for in-flight connection attempts
pub mod cache;
/// Configuration management
pub mod config;
/// Shared resource container injected into routes
pub mod context;
/// Database layer (SQLite via sqlx)
pub mod database;
/// Unified error handling
pub mod errors;
/// Structured logging setup
pub mod logging;
/// Domain models
pub mod models;
/// Garmin OAuth2/PKCE client
pub mod oauth2_client;
/// HTTP routes
pub mod routes;
/// Token persistence and webhook ingestion services
pub mod services;
