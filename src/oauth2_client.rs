// ABOUTME: OAuth2/PKCE client for the Garmin Connect authorization and token endpoints
// ABOUTME: Generates PKCE pairs, builds authorize URLs, exchanges codes, refreshes tokens, fetches profile data
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! OAuth2 client for Garmin Connect.
//!
//! Implements the authorization-code + PKCE flow: verifier/challenge
//! generation, authorize-URL assembly, the server-to-server code exchange,
//! token refresh, and the two profile endpoints used to resolve the
//! provider-side user id after a successful exchange.

use crate::errors::{AppError, AppResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};
use url::Url;

/// `PKCE` (Proof Key for Code Exchange) parameters for the connect flow
#[derive(Debug, Clone)]
pub struct PkceParams {
    /// Random secret kept server-side until the code exchange
    pub code_verifier: String,
    /// `base64url(sha256(code_verifier))`
    pub code_challenge: String,
    /// Challenge method, always `S256`
    pub code_challenge_method: String,
}

impl PkceParams {
    /// Generate `PKCE` parameters with the `S256` challenge method
    #[must_use]
    pub fn generate() -> Self {
        // Cryptographically secure random code verifier (43-128 characters
        // from the RFC 7636 unreserved set)
        const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        let mut rng = rand::thread_rng();
        let code_verifier: String = (0..128)
            .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        let hash = hasher.finalize();
        let code_challenge = URL_SAFE_NO_PAD.encode(hash);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".into(),
        }
    }
}

/// Generate an independent random state token for CSRF binding
#[must_use]
pub fn generate_state() -> String {
    const CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARS[rng.gen_range(0..CHARS.len())] as char)
        .collect()
}

/// Endpoint and credential configuration for the Garmin OAuth client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GarminOAuthConfig {
    /// OAuth client id registered with Garmin
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Authorize endpoint shown to the athlete's browser
    pub auth_url: String,
    /// Token endpoint for code exchange and refresh
    pub token_url: String,
    /// Base URL for the wellness REST API (user id / profile endpoints)
    pub api_base_url: String,
    /// Redirect URI; must byte-for-byte match the provider registration
    pub redirect_uri: String,
    /// Scopes requested at authorization time
    pub scopes: Vec<String>,
}

/// Token response from the Garmin token endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct GarminTokenResponse {
    /// Bearer access token
    pub access_token: String,
    /// Refresh token
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Granted scope string, when reported
    pub scope: Option<String>,
    /// Provider user id, when the token endpoint includes it
    #[serde(alias = "userId", alias = "garmin_user_id")]
    pub user_id: Option<String>,
}

/// OAuth2/PKCE client for Garmin Connect
///
/// Explicitly constructed and injected into services; holds its own
/// `reqwest::Client` rather than reaching for a process-wide singleton.
pub struct GarminOAuthClient {
    config: GarminOAuthConfig,
    client: reqwest::Client,
}

impl GarminOAuthClient {
    /// Create a new client from configuration
    #[must_use]
    pub fn new(config: GarminOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Endpoint configuration in use
    #[must_use]
    pub const fn config(&self) -> &GarminOAuthConfig {
        &self.config
    }

    /// Build the provider authorize URL for one connection attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the configured client id is empty or the
    /// authorize URL is malformed.
    pub fn authorization_url(&self, pkce: &PkceParams, state: &str) -> AppResult<String> {
        if self.config.client_id.is_empty() {
            return Err(AppError::config("Garmin client id is empty"));
        }

        let mut url = Url::parse(&self.config.auth_url)
            .map_err(|e| AppError::config(format!("invalid Garmin auth URL: {e}")))?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", &pkce.code_challenge_method)
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange an authorization code plus verifier for a token pair
    ///
    /// Authorization codes are single-use by provider contract; a retry
    /// with the same code fails at the provider, not here.
    ///
    /// # Errors
    ///
    /// Returns `ExchangeFailed` when the provider responds with a
    /// non-success status; the provider's error body is logged and carried
    /// in the error message.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> AppResult<GarminTokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                AppError::exchange_failed(format!("token endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status = %status,
                body = %body,
                "Garmin token exchange rejected"
            );
            return Err(AppError::exchange_failed(format!(
                "provider returned {status}: {body}"
            )));
        }

        let tokens: GarminTokenResponse = response.json().await.map_err(|e| {
            AppError::exchange_failed(format!("invalid token response body: {e}"))
        })?;

        debug!(
            expires_in = tokens.expires_in,
            has_user_id = tokens.user_id.is_some(),
            "Garmin token exchange succeeded"
        );
        Ok(tokens)
    }

    /// Obtain a fresh token pair using a refresh token
    ///
    /// # Errors
    ///
    /// Returns `ExchangeFailed` when the provider rejects the refresh.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> AppResult<GarminTokenResponse> {
        let params = [
            ("grant_type", "refresh_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                AppError::exchange_failed(format!("token endpoint unreachable: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %body, "Garmin token refresh rejected");
            return Err(AppError::exchange_failed(format!(
                "refresh rejected with {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::exchange_failed(format!("invalid refresh response body: {e}")))
    }

    /// Fetch the user-info document carrying the stable provider user id
    ///
    /// # Errors
    ///
    /// Returns `ProfileFetchFailed` on any transport or non-success
    /// response; callers treat this as non-fatal to token persistence.
    pub async fn fetch_user_info(&self, access_token: &str) -> AppResult<serde_json::Value> {
        let url = format!("{}/user/id", self.config.api_base_url.trim_end_matches('/'));
        self.authorized_get(&url, access_token).await
    }

    /// Fetch the athlete's full provider profile
    ///
    /// Used as a fallback when the token response and user-id endpoint
    /// both fail to yield a provider user id.
    ///
    /// # Errors
    ///
    /// Returns `ProfileFetchFailed` on any transport or non-success response.
    pub async fn fetch_user_profile(&self, access_token: &str) -> AppResult<serde_json::Value> {
        let url = format!(
            "{}/user/profile",
            self.config.api_base_url.trim_end_matches('/')
        );
        self.authorized_get(&url, access_token).await
    }

    async fn authorized_get<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> AppResult<T> {
        let response = self
            .client
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::profile_fetch_failed(format!("{url} unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, url = %url, body = %body, "Garmin profile request failed");
            return Err(AppError::profile_fetch_failed(format!(
                "{url} returned {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::profile_fetch_failed(format!("invalid body from {url}: {e}")))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn test_config() -> GarminOAuthConfig {
        GarminOAuthConfig {
            client_id: "gofast-client".into(),
            client_secret: "secret".into(),
            auth_url: "https://connect.garmin.com/oauth2Confirm".into(),
            token_url: "https://diauth.garmin.com/di-oauth2-service/oauth/token".into(),
            api_base_url: "https://apis.garmin.com/wellness-api/rest".into(),
            redirect_uri: "https://api.gofast.run/api/garmin/callback".into(),
            scopes: vec!["activity_export".into()],
        }
    }

    #[test]
    fn pkce_challenge_is_s256_of_verifier() {
        let pkce = PkceParams::generate();
        let mut hasher = Sha256::new();
        hasher.update(pkce.code_verifier.as_bytes());
        let expected = URL_SAFE_NO_PAD.encode(hasher.finalize());
        assert_eq!(pkce.code_challenge, expected);
        assert_eq!(pkce.code_challenge_method, "S256");
        assert_eq!(pkce.code_verifier.len(), 128);
    }

    #[test]
    fn state_tokens_are_independent() {
        let a = generate_state();
        let b = generate_state();
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn authorization_url_carries_pkce_parameters() {
        let client = GarminOAuthClient::new(test_config());
        let pkce = PkceParams::generate();
        let url = client.authorization_url(&pkce, "state-123").unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<_, _> = parsed.query_pairs().collect();

        assert_eq!(pairs["client_id"], "gofast-client");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["code_challenge"], pkce.code_challenge);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["state"], "state-123");
    }

    #[test]
    fn authorization_url_rejects_empty_client_id() {
        let mut config = test_config();
        config.client_id = String::new();
        let client = GarminOAuthClient::new(config);
        let pkce = PkceParams::generate();
        assert!(client.authorization_url(&pkce, "s").is_err());
    }
}
