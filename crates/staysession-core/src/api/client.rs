//! Thin HTTP client bound to the session cache.
//!
//! Requests carry the cache's access credential as a bearer token. A 401
//! response forces a logout through the global hook, and `refresh` pushes
//! renewed credentials back through the credential hook.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header, Client, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::hooks::{self, CredentialUpdate};
use crate::auth::SessionCache;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Endpoint exchanging a refresh credential for a new access credential
const REFRESH_PATH: &str = "token/refresh/";

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
    /// Present only when the server rotates refresh credentials
    #[serde(default)]
    refresh: Option<String>,
}

/// API client for the marketplace backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    session: SessionCache,
}

impl ApiClient {
    pub fn new(base_url: &str, session: SessionCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let mut headers = header::HeaderMap::new();
        if let Some(value) = self.session.authorization_header() {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&value)?,
            );
        }
        Ok(headers)
    }

    /// Map a failed response to an error. A 401 logs the session out
    /// before the error is returned.
    async fn error_for(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = ApiError::from_status(status, &body);
        if matches!(error, ApiError::Unauthorized) {
            let logged_out = hooks::force_logout();
            warn!(logged_out, "Server rejected credentials, forcing logout");
        }
        error
    }

    /// Ok(Some(response)) for success, Ok(None) for rate limit (should retry)
    async fn check_response_for_retry(response: reqwest::Response) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            Err(Self::error_for(response).await.into())
        }
    }

    async fn send<T: DeserializeOwned>(&self, url: &str, build: impl Fn() -> RequestBuilder) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()
                .headers(self.auth_headers()?)
                .send()
                .await
                .with_context(|| format!("Failed to send request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        self.send(&url, || self.client.get(&url)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.url(path);
        self.send(&url, || self.client.post(&url).json(body)).await
    }

    /// Exchange the refresh credential for a new access credential and push
    /// the result into the live session cache.
    pub async fn refresh(&self) -> Result<()> {
        let refresh = self
            .session
            .refresh_credential()
            .ok_or(ApiError::NoRefreshCredential)?;

        let url = self.url(REFRESH_PATH);
        let response = self
            .client
            .post(&url)
            .json(&RefreshRequest { refresh: &refresh })
            .send()
            .await
            .context("Failed to send refresh request")?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await.into());
        }

        let renewed: RefreshResponse = response
            .json()
            .await
            .context("Failed to parse refresh response")?;
        let rotated = renewed.refresh.is_some();

        let update = CredentialUpdate::refreshed(renewed.access, renewed.refresh.or(Some(refresh)));
        match hooks::push_credentials(update) {
            Some(Ok(())) => {
                info!(rotated, "Access credential refreshed");
                Ok(())
            }
            Some(Err(e)) => Err(ApiError::SessionRejected(e).into()),
            None => Err(ApiError::NoActiveSession.into()),
        }
    }

    /// Refresh when the access credential is inside the look-ahead window.
    /// Returns whether a refresh happened.
    pub async fn ensure_fresh(&self) -> Result<bool> {
        if !self.session.needs_refresh() {
            return Ok(false);
        }
        if self.session.refresh_credential().is_none() {
            debug!("Access credential expiring but no refresh credential held");
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }
}
