//! API client for the CMS authentication endpoints.
//!
//! Covers `/auth/login`, `/auth/refresh`, `/auth/logout` and `/users/me`.
//! Payloads are wrapped in a `{"data": ...}` envelope and token lifetimes are
//! reported in milliseconds.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use super::{ApiError, AuthBackend};
use crate::error::AuthError;
use crate::models::{AuthTokens, SessionUser};

// ============================================================================
// Constants
// ============================================================================

/// Fields requested from `/users/me`, including the embedded role record.
const CURRENT_USER_FIELDS: &str =
    "id,email,first_name,last_name,avatar,role.id,role.name,role.description,role.admin_access";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct AuthPayload {
    access_token: String,
    refresh_token: String,
    /// Access token lifetime in milliseconds
    expires: u64,
}

impl From<AuthPayload> for AuthTokens {
    fn from(payload: AuthPayload) -> Self {
        AuthTokens {
            access_token: payload.access_token,
            refresh_token: payload.refresh_token,
            expires_in: Duration::from_millis(payload.expires),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    mode: &'static str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
    mode: &'static str,
}

#[derive(Serialize)]
struct LogoutRequest<'a> {
    refresh_token: &'a str,
}

/// API client for the CMS.
/// Clone is cheap - clones share the connection pool and the installed bearer.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Arc<RwLock<Option<String>>>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The bearer currently installed, for callers issuing their own requests.
    pub fn bearer_token(&self) -> Option<String> {
        self.token.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        if let Some(ref token) = *self.token.read() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ApiError::InvalidResponse(format!("unusable token: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// POST to one of the unauthenticated token endpoints.
    async fn post_token<B: Serialize>(&self, path: &str, body: &B) -> Result<reqwest::Response, ApiError> {
        let url = self.url(path);
        debug!(url = %url, "POST");
        Ok(self.client.post(&url).json(body).send().await?)
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await?;

            if response.status().as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let response = Self::check_response(response).await?;
            return Ok(response.json().await?);
        }
    }

    async fn parse_tokens(response: reqwest::Response) -> Result<AuthTokens, ApiError> {
        let envelope: Envelope<AuthPayload> = response.json().await?;
        Ok(envelope.data.into())
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, AuthError> {
        let body = LoginRequest {
            email,
            password,
            mode: "json",
        };
        let response = self
            .post_token("/auth/login", &body)
            .await
            .map_err(AuthError::from_login)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_login(ApiError::from_login_status(status, &body)));
        }

        Self::parse_tokens(response).await.map_err(AuthError::from_login)
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let body = RefreshRequest {
            refresh_token,
            mode: "json",
        };
        let response = self
            .post_token("/auth/refresh", &body)
            .await
            .map_err(AuthError::from_refresh)?;
        let response = Self::check_response(response)
            .await
            .map_err(AuthError::from_refresh)?;

        Self::parse_tokens(response).await.map_err(AuthError::from_refresh)
    }

    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        let response = self
            .post_token("/auth/logout", &LogoutRequest { refresh_token })
            .await
            .map_err(AuthError::from_api)?;
        Self::check_response(response)
            .await
            .map_err(AuthError::from_api)?;
        Ok(())
    }

    async fn current_user(&self) -> Result<SessionUser, AuthError> {
        let url = format!("{}?fields={}", self.url("/users/me"), CURRENT_USER_FIELDS);
        let envelope: Envelope<SessionUser> = self.get(&url).await.map_err(AuthError::from_api)?;
        Ok(envelope.data)
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }
}
