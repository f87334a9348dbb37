use thiserror::Error;

use crate::api::ApiError;

/// Failures surfaced by the session layer.
///
/// `Clone` so every caller joined on one refresh receives the same value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Credentials were rejected. Not retried.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Transport failure or timeout. The caller may retry.
    #[error("Network error: {0}")]
    Network(String),

    /// Refresh token absent or rejected. Forces a new login.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Authenticated, but the role does not grant administrator access.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Nothing has ever been stored on this device.
    #[error("No session - please log in")]
    NoSession,

    /// The backend answered with something we could not use.
    #[error("Unexpected response from server: {0}")]
    Remote(String),
}

impl AuthError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::Network(_))
    }

    /// True when the only way forward is showing the login screen again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::SessionExpired(_) | AuthError::AccessDenied(_) | AuthError::NoSession
        )
    }

    /// Map an HTTP failure from the `login` endpoint.
    pub fn from_login(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials | ApiError::Unauthorized => {
                AuthError::Authentication("invalid email or password".to_string())
            }
            ApiError::AccessDenied(body) => AuthError::Authentication(body),
            other => Self::from_transport(other),
        }
    }

    /// Map an HTTP failure from the `refresh` endpoint. Any rejection of the
    /// token itself is terminal.
    pub fn from_refresh(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials | ApiError::Unauthorized | ApiError::AccessDenied(_) => {
                AuthError::SessionExpired("refresh token rejected".to_string())
            }
            other => Self::from_transport(other),
        }
    }

    /// Map an HTTP failure from an authenticated call (`current-user`, `logout`).
    pub fn from_api(err: ApiError) -> Self {
        match err {
            ApiError::InvalidCredentials | ApiError::Unauthorized => {
                AuthError::SessionExpired("access token rejected".to_string())
            }
            ApiError::AccessDenied(body) => AuthError::AccessDenied(body),
            other => Self::from_transport(other),
        }
    }

    fn from_transport(err: ApiError) -> Self {
        match err {
            ApiError::NetworkError(msg) => AuthError::Network(msg),
            ApiError::RateLimited => AuthError::Network(err.to_string()),
            ApiError::ServerError(_) => AuthError::Network(err.to_string()),
            other => AuthError::Remote(other.to_string()),
        }
    }
}
