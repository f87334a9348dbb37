//! The auth session manager.
//!
//! `SessionManager` is the only component that talks to the remote auth
//! service. It keeps the credential store fresh for any number of concurrent
//! callers, renews in the background, and only lets administrator principals
//! keep a verified session.
//!
//! Refreshes are single-flight: the first caller that finds the token stale
//! spawns the refresh and publishes a shared handle to its result; everyone
//! else who arrives before it finishes awaits that same handle. The handle is
//! removed in the same critical section that writes the outcome into the
//! store, so a caller taking the lock afterwards already sees the new pair.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::admin::is_admin;
use super::credentials::CredentialStore;
use super::scheduler::AutoRefresh;
use super::storage::TokenPersistence;
use crate::api::AuthBackend;
use crate::error::AuthError;
use crate::models::{AuthCheck, SessionState, SessionUser, TokenPair, TokenStatus};

/// Default renewal margin before hard expiry (5 minutes)
const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

/// Default per-call timeout for remote auth calls
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Smallest period accepted for the background timer
const MIN_AUTO_REFRESH_INTERVAL: Duration = Duration::from_millis(1);

type SharedRefresh = Shared<BoxFuture<'static, Result<TokenPair, AuthError>>>;

/// Tunables for a session manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Renew once the access token has less than this left.
    pub refresh_buffer: Duration,
    /// Upper bound on every remote call.
    pub request_timeout: Duration,
    /// Role id that always passes the administrator check.
    pub admin_role_id: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::from_secs(DEFAULT_REFRESH_BUFFER_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            admin_role_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RefreshMode {
    /// Always hit the remote (or join whatever is in flight).
    Force,
    /// Skip the remote if the token turned fresh while we waited for the lock.
    IfStale,
}

/// Handle to the session. Cheap to clone; all clones share one session.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    backend: Arc<dyn AuthBackend>,
    store: CredentialStore,
    options: SessionOptions,
    state: Mutex<SessionState>,
    in_flight: AsyncMutex<Option<SharedRefresh>>,
    auto_refresh: AutoRefresh,
}

impl SessionManager {
    /// Build a manager over an existing store. Whatever the store holds is
    /// installed as the backend's bearer, unverified.
    pub fn new(backend: Arc<dyn AuthBackend>, store: CredentialStore, options: SessionOptions) -> Self {
        let state = match store.access_token() {
            Some(token) => {
                backend.set_token(Some(token));
                SessionState::HasTokens
            }
            None => SessionState::NoSession,
        };
        debug!(%state, "Session manager initialized");

        Self {
            inner: Arc::new(Inner {
                backend,
                store,
                options,
                state: Mutex::new(state),
                in_flight: AsyncMutex::new(None),
                auto_refresh: AutoRefresh::default(),
            }),
        }
    }

    /// Build a manager whose store is primed from `storage`.
    pub fn with_storage(
        backend: Arc<dyn AuthBackend>,
        storage: Arc<dyn TokenPersistence>,
        options: SessionOptions,
    ) -> Self {
        Self::new(backend, CredentialStore::load(storage), options)
    }

    // =========================================================================
    // Login / logout
    // =========================================================================

    /// Authenticate with email and password and fetch the resulting user.
    ///
    /// No administrator check happens here; use `check_authentication` for that.
    pub async fn login(&self, email: &str, password: &str) -> Result<SessionUser, AuthError> {
        let inner = &self.inner;
        info!(email = email, "Logging in");

        let tokens = match inner.remote("login", inner.backend.login(email, password)).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };
        let pair = TokenPair::issued(tokens, Utc::now());

        {
            let _slot = inner.settled_slot().await;
            inner.install(pair);
            inner.set_state(SessionState::HasTokens);
        }

        let user = self.get_current_user().await?;
        info!(user_id = %user.id, "Login successful");
        Ok(user)
    }

    /// End the session. The remote invalidation is best-effort; local state is
    /// always cleared.
    pub async fn logout(&self) {
        let inner = &self.inner;
        let slot = inner.settled_slot().await;

        if let Some(refresh_token) = inner.store.refresh_token() {
            if let Err(e) = inner.remote("logout", inner.backend.logout(&refresh_token)).await {
                warn!(error = %e, "Remote logout failed, clearing local session anyway");
            }
        }
        inner.discard();
        drop(slot);
        info!("Logged out");
    }

    // =========================================================================
    // Token freshness
    // =========================================================================

    /// Exchange the refresh token for a new pair.
    ///
    /// Concurrent callers share one remote call and see the same outcome. A
    /// rejected refresh token clears the session.
    pub async fn refresh_access_token(&self) -> Result<TokenPair, AuthError> {
        self.inner.refresh(RefreshMode::Force).await
    }

    /// Make sure the stored access token is not stale, refreshing if needed.
    /// Every privileged call path goes through here first.
    pub async fn ensure_valid_token(&self) -> Result<(), AuthError> {
        self.inner.ensure_valid_token().await
    }

    /// `ensure_valid_token`, then hand back the access token to use.
    pub async fn authorized_token(&self) -> Result<String, AuthError> {
        self.ensure_valid_token().await?;
        self.inner
            .store
            .access_token()
            .ok_or_else(|| AuthError::SessionExpired("session ended".to_string()))
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Verify the stored session end to end: tokens fresh, user fetched,
    /// administrator access confirmed. This is what makes a session `Valid`.
    pub async fn check_authentication(&self) -> Result<AuthCheck, AuthError> {
        let inner = &self.inner;
        if !inner.store.has_tokens() {
            return Err(AuthError::NoSession);
        }

        {
            let _slot = inner.settled_slot().await;
            if let Err(e) = inner.store.reload_from_storage() {
                warn!(error = %e, "Failed to reload stored session, using in-memory copy");
            }
            inner.backend.set_token(inner.store.access_token());
            inner.set_state(SessionState::Verifying);
        }

        let user = match self.verified_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!(error = %e, "Session verification failed, clearing session");
                let _slot = inner.settled_slot().await;
                inner.discard();
                return Err(e);
            }
        };

        if !is_admin(&user, inner.options.admin_role_id.as_deref()) {
            warn!(
                user_id = %user.id,
                role = ?user.role.as_ref().map(|r| r.id()),
                "User lacks administrator access, logging out"
            );
            self.logout().await;
            return Err(AuthError::AccessDenied(format!(
                "{} does not have administrator access",
                user.display_name()
            )));
        }

        inner.set_state(SessionState::Valid);
        info!(user_id = %user.id, "Session verified");
        Ok(AuthCheck {
            user,
            is_valid: true,
        })
    }

    async fn verified_user(&self) -> Result<SessionUser, AuthError> {
        self.ensure_valid_token().await?;
        self.get_current_user().await
    }

    /// Fetch the principal behind the installed bearer.
    pub async fn get_current_user(&self) -> Result<SessionUser, AuthError> {
        let inner = &self.inner;
        inner.remote("current-user", inner.backend.current_user()).await
    }

    // =========================================================================
    // Background renewal
    // =========================================================================

    /// Start the recurring renewal timer, replacing any running one.
    ///
    /// Each tick renews when the remaining lifetime is within the refresh
    /// buffer. Failures are logged; the next `ensure_valid_token` surfaces a
    /// session that has really died. Must be called inside a tokio runtime.
    pub fn start_auto_refresh(&self, interval: Duration) {
        let interval = interval.max(MIN_AUTO_REFRESH_INTERVAL);
        let weak = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(run_auto_refresh(weak, interval));
        self.inner.auto_refresh.replace(handle);
        info!(interval_ms = interval.as_millis() as u64, "Auto-refresh started");
    }

    pub fn stop_auto_refresh(&self) {
        if self.inner.auto_refresh.cancel() {
            info!("Auto-refresh stopped");
        }
    }

    pub fn is_auto_refresh_running(&self) -> bool {
        self.inner.auto_refresh.is_running()
    }

    /// Teardown: stop background work. The stored session is left as is.
    pub fn shutdown(&self) {
        self.stop_auto_refresh();
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// True while tokens are stored and the session has not been invalidated:
    /// `HasTokens`, `Valid`, and `Verifying` (a check or refresh in progress
    /// on a session that held tokens).
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.has_tokens()
            && !matches!(self.state(), SessionState::NoSession | SessionState::Invalid)
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn token_status(&self) -> TokenStatus {
        self.inner.store.status(self.inner.options.refresh_buffer)
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.store.access_token()
    }

    pub fn credential_store(&self) -> &CredentialStore {
        &self.inner.store
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }
}

impl Inner {
    async fn ensure_valid_token(self: &Arc<Self>) -> Result<(), AuthError> {
        if !self.store.has_tokens() {
            return Err(AuthError::SessionExpired("no stored session".to_string()));
        }
        if !self.store.is_expired(self.options.refresh_buffer) {
            return Ok(());
        }
        debug!("Access token stale, refreshing");
        self.refresh(RefreshMode::IfStale).await.map(|_| ())
    }

    /// Join the in-flight refresh or start one.
    async fn refresh(self: &Arc<Self>, mode: RefreshMode) -> Result<TokenPair, AuthError> {
        let flight = {
            let mut slot = self.in_flight.lock().await;
            if let Some(flight) = slot.as_ref().cloned() {
                debug!("Joining in-flight refresh");
                flight
            } else {
                if mode == RefreshMode::IfStale && !self.store.is_expired(self.options.refresh_buffer) {
                    if let Some(pair) = self.store.current() {
                        debug!("Token already renewed by another caller");
                        return Ok(pair);
                    }
                }
                let refresh_token = self.store.refresh_token().ok_or_else(|| {
                    AuthError::SessionExpired("no refresh token stored".to_string())
                })?;
                let flight = self.spawn_refresh(refresh_token);
                *slot = Some(flight.clone());
                flight
            }
        };
        flight.await
    }

    /// Caller must hold the in-flight lock.
    fn spawn_refresh(self: &Arc<Self>, refresh_token: String) -> SharedRefresh {
        let prior = self.set_state(SessionState::Verifying);
        let task = tokio::spawn(Arc::clone(self).run_refresh(refresh_token, prior));

        let inner = Arc::clone(self);
        async move {
            match task.await {
                Ok(result) => result,
                Err(e) => {
                    // The task died before it could clear the slot itself
                    inner.in_flight.lock().await.take();
                    Err(AuthError::Network(format!("refresh task failed: {}", e)))
                }
            }
        }
        .boxed()
        .shared()
    }

    async fn run_refresh(
        self: Arc<Self>,
        refresh_token: String,
        prior: SessionState,
    ) -> Result<TokenPair, AuthError> {
        info!("Refreshing access token");
        let outcome = self.remote("refresh", self.backend.refresh(&refresh_token)).await;

        let mut slot = self.in_flight.lock().await;
        let result = match outcome {
            Ok(tokens) => {
                let pair = TokenPair::issued(tokens, Utc::now());
                self.install(pair.clone());
                self.set_state(if prior == SessionState::Valid {
                    SessionState::Valid
                } else {
                    SessionState::HasTokens
                });
                debug!(expires_at = %pair.expires_at, "Access token refreshed");
                Ok(pair)
            }
            Err(err @ AuthError::SessionExpired(_)) => {
                warn!(error = %err, "Refresh token rejected, ending session");
                self.discard();
                Err(err)
            }
            Err(err) => {
                warn!(error = %err, "Token refresh failed");
                let next = if self.store.time_remaining().is_zero() {
                    SessionState::Invalid
                } else if prior == SessionState::Valid {
                    SessionState::Valid
                } else {
                    SessionState::HasTokens
                };
                self.set_state(next);
                Err(err)
            }
        };
        *slot = None;
        result
    }

    /// The in-flight lock, taken once no refresh is pending. Holding it keeps
    /// new refreshes from starting.
    async fn settled_slot(&self) -> MutexGuard<'_, Option<SharedRefresh>> {
        loop {
            let slot = self.in_flight.lock().await;
            let pending = slot.clone();
            match pending {
                None => return slot,
                Some(flight) => {
                    drop(slot);
                    debug!("Waiting for in-flight refresh to settle");
                    let _ = flight.await;
                }
            }
        }
    }

    /// Store `pair` and make it the default bearer.
    fn install(&self, pair: TokenPair) {
        self.backend.set_token(Some(pair.access_token.clone()));
        self.store.save(pair);
    }

    /// Drop every trace of the session locally.
    fn discard(&self) {
        self.store.clear();
        self.backend.set_token(None);
        self.set_state(SessionState::NoSession);
    }

    /// Returns the previous state.
    fn set_state(&self, next: SessionState) -> SessionState {
        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, next);
        if previous != next {
            debug!(from = %previous, to = %next, "Session state changed");
        }
        previous
    }

    async fn remote<T, F>(&self, operation: &'static str, call: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        let timeout = self.options.request_timeout;
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout_ms = timeout.as_millis() as u64, "Remote call timed out");
                Err(AuthError::Network(format!(
                    "{} timed out after {}ms",
                    operation,
                    timeout.as_millis()
                )))
            }
        }
    }

    async fn auto_refresh_tick(self: &Arc<Self>) {
        if !self.store.has_tokens() {
            debug!("No session, skipping auto-refresh tick");
            return;
        }
        let remaining = self.store.time_remaining();
        if remaining > self.options.refresh_buffer {
            return;
        }
        debug!(remaining_secs = remaining.as_secs(), "Token near expiry, renewing in background");
        if let Err(e) = self.refresh(RefreshMode::IfStale).await {
            warn!(error = %e, "Background token refresh failed");
        }
    }
}

async fn run_auto_refresh(inner: Weak<Inner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            debug!("Session manager dropped, auto-refresh exiting");
            return;
        };
        inner.auto_refresh_tick().await;
    }
}
