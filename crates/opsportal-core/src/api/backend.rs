use async_trait::async_trait;

use crate::error::AuthError;
use crate::models::{AuthTokens, SessionUser};

/// The remote authentication service as seen by the session manager.
///
/// Every call except `login` and `refresh` carries the bearer installed with
/// `set_token`.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, email: &str, password: &str) -> Result<AuthTokens, AuthError>;

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;

    /// Invalidate `refresh_token` server-side.
    async fn logout(&self, refresh_token: &str) -> Result<(), AuthError>;

    async fn current_user(&self) -> Result<SessionUser, AuthError>;

    /// Install (or remove) the default bearer credential for later calls.
    fn set_token(&self, token: Option<String>);
}
