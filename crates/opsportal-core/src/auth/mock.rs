//! Scripted in-memory backend for session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::api::AuthBackend;
use crate::error::AuthError;
use crate::models::{AuthTokens, Role, RoleRecord, SessionUser};

pub(crate) const TOKEN_TTL: Duration = Duration::from_secs(900);

pub(crate) struct MockBackend {
    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub user_calls: AtomicUsize,
    issued: AtomicUsize,
    delay: Mutex<Duration>,
    login_error: Mutex<Option<AuthError>>,
    refresh_error: Mutex<Option<AuthError>>,
    logout_error: Mutex<Option<AuthError>>,
    user: Mutex<Result<SessionUser, AuthError>>,
    token: Mutex<Option<String>>,
    refreshed_with: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            user_calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            delay: Mutex::new(Duration::ZERO),
            login_error: Mutex::new(None),
            refresh_error: Mutex::new(None),
            logout_error: Mutex::new(None),
            user: Mutex::new(Ok(admin_user())),
            token: Mutex::new(None),
            refreshed_with: Mutex::new(Vec::new()),
        }
    }

    /// Every remote call sleeps this long first.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = delay;
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn fail_login(&self, err: AuthError) {
        *self.login_error.lock() = Some(err);
    }

    pub fn fail_refresh(&self, err: AuthError) {
        *self.refresh_error.lock() = Some(err);
    }

    pub fn succeed_refresh(&self) {
        *self.refresh_error.lock() = None;
    }

    pub fn fail_logout(&self, err: AuthError) {
        *self.logout_error.lock() = Some(err);
    }

    pub fn set_user(&self, user: Result<SessionUser, AuthError>) {
        *self.user.lock() = user;
    }

    pub fn installed_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    pub fn refreshed_with(&self) -> Vec<String> {
        self.refreshed_with.lock().clone()
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Tokens look like `login-access-1`, `refreshed-refresh-2`.
    fn issue(&self, kind: &str) -> AuthTokens {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        AuthTokens {
            access_token: format!("{}-access-{}", kind, n),
            refresh_token: format!("{}-refresh-{}", kind, n),
            expires_in: TOKEN_TTL,
        }
    }
}

#[async_trait]
impl AuthBackend for MockBackend {
    async fn login(&self, _email: &str, _password: &str) -> Result<AuthTokens, AuthError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = self.login_error.lock().clone() {
            return Err(err);
        }
        Ok(self.issue("login"))
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refreshed_with.lock().push(refresh_token.to_string());
        self.pause().await;
        if let Some(err) = self.refresh_error.lock().clone() {
            return Err(err);
        }
        Ok(self.issue("refreshed"))
    }

    async fn logout(&self, _refresh_token: &str) -> Result<(), AuthError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        match self.logout_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn current_user(&self) -> Result<SessionUser, AuthError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        if self.token.lock().is_none() {
            return Err(AuthError::SessionExpired("no bearer installed".to_string()));
        }
        self.user.lock().clone()
    }

    fn set_token(&self, token: Option<String>) {
        *self.token.lock() = token;
    }
}

pub(crate) fn user_with_role(role: Option<Role>) -> SessionUser {
    SessionUser {
        id: "u-1".to_string(),
        email: "ops@example.com".to_string(),
        first_name: Some("Dana".to_string()),
        last_name: Some("Reyes".to_string()),
        avatar: None,
        role,
    }
}

pub(crate) fn admin_user() -> SessionUser {
    user_with_role(Some(Role::Embedded(RoleRecord {
        id: "role-admin".to_string(),
        name: Some("Administrator".to_string()),
        description: None,
        admin_access: Some(true),
    })))
}

pub(crate) fn editor_user() -> SessionUser {
    user_with_role(Some(Role::Embedded(RoleRecord {
        id: "role-editor".to_string(),
        name: Some("Editor".to_string()),
        description: Some("Edits invoices".to_string()),
        admin_access: Some(false),
    })))
}
