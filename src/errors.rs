// ABOUTME: Unified error handling for the Garmin integration service
// ABOUTME: Defines error codes, HTTP status mapping, and JSON response formatting
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! # Unified Error Handling
//!
//! Central error type used across the crate. Every error carries an
//! [`ErrorCode`] that maps onto an HTTP status and a stable machine-readable
//! code, so route handlers can convert any failure into a structured JSON
//! response without ad-hoc status juggling.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Required query or body fields are absent
    #[serde(rename = "MISSING_PARAMETERS")]
    MissingParameters,
    /// PKCE verifier expired or was never stored for this athlete
    #[serde(rename = "CODE_VERIFIER_EXPIRED")]
    VerifierExpired,
    /// Provider rejected the code/verifier/credentials during token exchange
    #[serde(rename = "EXCHANGE_FAILED")]
    ExchangeFailed,
    /// Provider profile/user-info endpoint call failed
    #[serde(rename = "PROFILE_FETCH_FAILED")]
    ProfileFetchFailed,
    /// Database write failed during token save
    #[serde(rename = "PERSISTENCE_FAILED")]
    PersistenceFailed,
    /// Webhook payload could not be matched to a known athlete or activity
    #[serde(rename = "WEBHOOK_UNMATCHED")]
    WebhookUnmatched,
    /// Requested resource does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    NotFound,
    /// Configuration missing or invalid
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
    /// Catch-all for internal failures
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::MissingParameters | Self::VerifierExpired => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::WebhookUnmatched => StatusCode::NOT_FOUND,
            Self::ExchangeFailed | Self::ProfileFetchFailed => StatusCode::BAD_GATEWAY,
            Self::PersistenceFailed | Self::ConfigError | Self::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short code used in frontend redirect query parameters
    #[must_use]
    pub const fn redirect_message(self) -> &'static str {
        match self {
            Self::MissingParameters => "missing_parameters",
            Self::VerifierExpired => "code_verifier_expired",
            Self::ExchangeFailed => "exchange_failed",
            Self::ProfileFetchFailed => "profile_fetch_failed",
            Self::PersistenceFailed => "persistence_failed",
            Self::WebhookUnmatched => "webhook_unmatched",
            Self::NotFound => "not_found",
            Self::ConfigError => "config_error",
            Self::InternalError => "internal_error",
        }
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error for chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Required parameter absent from the request
    pub fn missing_parameters(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingParameters, message)
    }

    /// Verifier missing or expired; the connect flow must be restarted
    pub fn verifier_expired(athlete_id: &str) -> Self {
        Self::new(
            ErrorCode::VerifierExpired,
            format!("no live code verifier for athlete {athlete_id}; restart the connect flow"),
        )
    }

    /// Provider rejected the token exchange
    pub fn exchange_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExchangeFailed, message)
    }

    /// Provider profile lookup failed
    pub fn profile_fetch_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ProfileFetchFailed, message)
    }

    /// Database write failed
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PersistenceFailed, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        Self::new(
            ErrorCode::PersistenceFailed,
            format!("database operation failed: {error}"),
        )
        .with_source(error)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(
            ErrorCode::InternalError,
            format!("serialization failed: {error}"),
        )
        .with_source(error)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// HTTP error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details
    pub error: ErrorResponseDetails,
}

/// Body of an error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    /// Stable machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message.clone(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        tracing::error!(code = ?self.code, status = %status, "{}", self.message);
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn error_code_http_status() {
        assert_eq!(
            ErrorCode::MissingParameters.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::VerifierExpired.http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::ExchangeFailed.http_status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ErrorCode::PersistenceFailed.http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn redirect_messages_are_stable() {
        assert_eq!(
            ErrorCode::VerifierExpired.redirect_message(),
            "code_verifier_expired"
        );
        assert_eq!(
            ErrorCode::MissingParameters.redirect_message(),
            "missing_parameters"
        );
    }

    #[test]
    fn error_response_serialization() {
        let error = AppError::exchange_failed("provider returned 400");
        let response = ErrorResponse::from(&error);
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("EXCHANGE_FAILED"));
        assert!(json.contains("provider returned 400"));
    }
}
