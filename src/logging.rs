// ABOUTME: Structured logging setup for observability and debugging
// ABOUTME: Configures log levels and output formats from environment variables
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Production logging configuration with structured output.

use std::env;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON format for production logging
    Json,
    /// Pretty format for development
    Pretty,
    /// Compact format for space-constrained environments
    Compact,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingConfig {
    /// Create logging configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let level = env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            Ok("compact") => LogFormat::Compact,
            _ => LogFormat::Pretty,
        };
        Self { level, format }
    }

    /// Install the global tracing subscriber
    ///
    /// Calling this twice is a no-op failure in tests; errors from
    /// re-initialization are ignored deliberately.
    pub fn init(&self) {
        let filter = EnvFilter::try_new(&self.level)
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let registry = tracing_subscriber::registry().with(filter);

        let result = match self.format {
            LogFormat::Json => registry
                .with(fmt::layer().json().with_current_span(false))
                .try_init(),
            LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
        };

        if result.is_ok() {
            tracing::info!(
                level = %self.level,
                format = ?self.format,
                "logging initialized"
            );
        }
    }
}
