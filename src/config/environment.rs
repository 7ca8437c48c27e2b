// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses env vars into typed server, Garmin, and store configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Environment-based configuration for production deployment.
//!
//! All configuration is environment-variable driven. Provider credentials
//! are required; endpoint URLs default to the public Garmin endpoints and
//! can be overridden for staging or stub servers in tests.

use crate::errors::{AppError, AppResult};
use crate::oauth2_client::GarminOAuthConfig;
use std::env;
use std::time::Duration;

/// Default verifier TTL when `GARMIN_VERIFIER_TTL_SECS` is unset
const DEFAULT_VERIFIER_TTL_SECS: u64 = 600;
/// Default HTTP port
const DEFAULT_HTTP_PORT: u16 = 8085;

/// Public Garmin endpoints, overridable per environment
mod garmin_defaults {
    pub const AUTH_URL: &str = "https://connect.garmin.com/oauth2Confirm";
    pub const TOKEN_URL: &str = "https://diauth.garmin.com/di-oauth2-service/oauth/token";
    pub const API_BASE_URL: &str = "https://apis.garmin.com/wellness-api/rest";
    pub const SCOPES: &str = "activity_export health_export";
}

/// Server-wide configuration loaded once at startup and injected everywhere
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP server binds to
    pub http_port: u16,
    /// Database connection URL (SQLite path or `sqlite::memory:`)
    pub database_url: String,
    /// Frontend base URL used as the callback redirect target
    pub frontend_base_url: String,
    /// TTL for in-flight connection attempts in the verifier store
    pub verifier_ttl: Duration,
    /// Garmin OAuth endpoints and credentials
    pub garmin: GarminOAuthConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable (`GARMIN_CLIENT_ID`,
    /// `GARMIN_CLIENT_SECRET`, `GARMIN_REDIRECT_URI`) is missing.
    pub fn from_env() -> AppResult<Self> {
        let client_id = require("GARMIN_CLIENT_ID")?;
        let client_secret = require("GARMIN_CLIENT_SECRET")?;
        let redirect_uri = require("GARMIN_REDIRECT_URI")?;

        let garmin = GarminOAuthConfig {
            client_id,
            client_secret,
            auth_url: env_or("GARMIN_AUTH_URL", garmin_defaults::AUTH_URL),
            token_url: env_or("GARMIN_TOKEN_URL", garmin_defaults::TOKEN_URL),
            api_base_url: env_or("GARMIN_API_BASE_URL", garmin_defaults::API_BASE_URL),
            redirect_uri,
            scopes: env_or("GARMIN_SCOPES", garmin_defaults::SCOPES)
                .split_whitespace()
                .map(str::to_owned)
                .collect(),
        };

        Ok(Self {
            http_port: env::var("HTTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HTTP_PORT),
            database_url: env_or("DATABASE_URL", "sqlite:gofast.db"),
            frontend_base_url: env_or("FRONTEND_BASE_URL", "http://localhost:3000"),
            verifier_ttl: Duration::from_secs(
                env::var("GARMIN_VERIFIER_TTL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_VERIFIER_TTL_SECS),
            ),
            garmin,
        })
    }

    /// Redirect URL for the frontend Garmin settings page
    #[must_use]
    pub fn settings_redirect(&self, query: &str) -> String {
        format!(
            "{}/settings/garmin?{query}",
            self.frontend_base_url.trim_end_matches('/')
        )
    }
}

fn require(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::config(format!("{name} not set")))
}

fn env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_redirect_strips_trailing_slash() {
        let config = ServerConfig {
            http_port: 0,
            database_url: "sqlite::memory:".into(),
            frontend_base_url: "https://gofast.run/".into(),
            verifier_ttl: Duration::from_secs(600),
            garmin: GarminOAuthConfig {
                client_id: "id".into(),
                client_secret: "secret".into(),
                auth_url: garmin_defaults::AUTH_URL.into(),
                token_url: garmin_defaults::TOKEN_URL.into(),
                api_base_url: garmin_defaults::API_BASE_URL.into(),
                redirect_uri: "https://api.gofast.run/api/garmin/callback".into(),
                scopes: vec!["activity_export".into()],
            },
        };
        assert_eq!(
            config.settings_redirect("status=success&athleteId=A1"),
            "https://gofast.run/settings/garmin?status=success&athleteId=A1"
        );
    }
}
