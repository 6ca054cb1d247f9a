//! Refresh-token exchange against the OAuth2 token endpoint.

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::REQUEST_TIMEOUT;
use crate::model::{Credentials, TokenPair};
use crate::store::Secret;

/// Fortnox OAuth2 token endpoint.
pub const FORTNOX_TOKEN_URL: &str = "https://apps.fortnox.se/oauth-v1/token";

/// Error type for the token exchange.
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The token endpoint answered with a non-success status.
    ///
    /// Fatal for this run; a 400/401 `invalid_grant` usually means the
    /// stored refresh token was already consumed and the integration needs
    /// re-authorization.
    #[error("token endpoint returned {status}: {body}")]
    Http { status: u16, body: String },

    /// The endpoint answered with success but the body was not a usable
    /// token payload. Signals an API contract change.
    #[error("malformed token response: {message}")]
    MalformedResponse { message: String },

    /// Connection or timeout failure. Transient; safe for the caller to
    /// retry with backoff.
    #[error("network error during token refresh: {0}")]
    Network(#[from] reqwest::Error),
}

/// Token endpoint success payload.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// Client for the `grant_type=refresh_token` exchange.
pub struct TokenRefresher {
    client: reqwest::Client,
    token_url: String,
}

impl TokenRefresher {
    /// Refresher against the production endpoint, [`FORTNOX_TOKEN_URL`].
    pub fn new() -> Self {
        Self::with_token_url(FORTNOX_TOKEN_URL)
    }

    /// Refresher against a custom token endpoint.
    pub fn with_token_url(token_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_url: token_url.into(),
        }
    }

    /// Exchange `creds.refresh_token` for a fresh access token.
    ///
    /// Sends the form-encoded refresh grant with a bounded timeout and maps
    /// the response onto [`RefreshError`]: non-success status to
    /// [`Http`](RefreshError::Http), a success body without an
    /// `access_token` to [`MalformedResponse`](RefreshError::MalformedResponse).
    /// When the server omits `refresh_token`, the input token is carried
    /// over into the returned pair unchanged.
    pub async fn exchange(&self, creds: &Credentials) -> Result<TokenPair, RefreshError> {
        tracing::info!(token_url = %self.token_url, "requesting new access token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", creds.refresh_token.expose()),
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.expose()),
        ];

        let response = self
            .client
            .post(&self.token_url)
            .timeout(REQUEST_TIMEOUT)
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = status.as_u16(), "token refresh rejected");
            return Err(RefreshError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse =
            serde_json::from_str(&body).map_err(|e| RefreshError::MalformedResponse {
                message: format!("invalid JSON: {e}"),
            })?;

        let access_token = payload
            .access_token
            .ok_or_else(|| RefreshError::MalformedResponse {
                message: "no access_token in response".to_string(),
            })?;

        let expires_at = payload
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs as i64));

        tracing::info!(expires_in = ?payload.expires_in, "new access token received");

        let refresh_token = match payload.refresh_token {
            Some(token) => Secret::new(token),
            None => creds.refresh_token.clone(),
        };

        Ok(TokenPair {
            access_token: Secret::new(access_token),
            refresh_token,
            expires_in: payload.expires_in,
            expires_at,
        })
    }
}

impl Default for TokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}
