use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::storage::TokenPersistence;
use crate::models::{TokenPair, TokenStatus};

/// Holds the current token pair and mirrors it to durable storage.
///
/// Queries are synchronous and never touch storage. The pair is swapped as a
/// whole under a write lock, so readers see either the old or the new pair.
/// Storage I/O happens outside that lock; writers are serialized by
/// `unsynced` instead.
pub struct CredentialStore {
    current: RwLock<Option<TokenPair>>,
    /// Held across storage I/O. True while the in-memory pair differs from
    /// storage because the last write failed.
    unsynced: Mutex<bool>,
    storage: Arc<dyn TokenPersistence>,
}

impl CredentialStore {
    /// Empty store over `storage`; nothing is read until `reload_from_storage`.
    pub fn new(storage: Arc<dyn TokenPersistence>) -> Self {
        Self {
            current: RwLock::new(None),
            unsynced: Mutex::new(false),
            storage,
        }
    }

    /// Store primed with whatever `storage` holds. An unreadable entry is
    /// logged and treated as empty.
    pub fn load(storage: Arc<dyn TokenPersistence>) -> Self {
        let store = Self::new(storage);
        if let Err(e) = store.reload_from_storage() {
            warn!(error = %e, "Failed to load stored session, starting without one");
        }
        store
    }

    /// Replace the pair. A persistence failure is logged; the in-memory pair
    /// is installed regardless and wins over storage until a write succeeds.
    pub fn save(&self, pair: TokenPair) {
        let mut unsynced = self.unsynced.lock();
        *unsynced = match self.storage.store(&pair) {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "Failed to persist session, keeping it in memory only");
                true
            }
        };
        debug!(expires_at = %pair.expires_at, "Session saved");
        *self.current.write() = Some(pair);
    }

    pub fn clear(&self) {
        let mut unsynced = self.unsynced.lock();
        *unsynced = match self.storage.remove() {
            Ok(()) => false,
            Err(e) => {
                warn!(error = %e, "Failed to remove persisted session");
                true
            }
        };
        if self.current.write().take().is_some() {
            debug!("Session cleared");
        }
    }

    /// Re-read the persisted pair into memory. Returns whether a pair is held
    /// afterwards. On a read error the in-memory pair is left alone.
    ///
    /// If the last `save` or `clear` never reached storage, storage is stale:
    /// the write is retried and the in-memory pair is kept either way.
    pub fn reload_from_storage(&self) -> Result<bool> {
        let mut unsynced = self.unsynced.lock();
        if *unsynced {
            let current = self.current();
            let written = match current.as_ref() {
                Some(pair) => self.storage.store(pair),
                None => self.storage.remove(),
            };
            match written {
                Ok(()) => {
                    *unsynced = false;
                    debug!("Unsaved session written to storage");
                }
                Err(e) => warn!(error = %e, "Storage still unwritable, keeping in-memory session"),
            }
            return Ok(current.is_some());
        }

        let loaded = self.storage.load()?;
        let found = loaded.is_some();
        *self.current.write() = loaded;
        debug!(found, "Session reloaded from storage");
        Ok(found)
    }

    pub fn current(&self) -> Option<TokenPair> {
        self.current.read().clone()
    }

    pub fn has_tokens(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|p| p.access_token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.current.read().as_ref().map(|p| p.refresh_token.clone())
    }

    /// True if `now + buffer >= expires_at`, or if nothing is stored.
    pub fn is_expired(&self, buffer: Duration) -> bool {
        self.is_expired_at(Utc::now(), buffer)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>, buffer: Duration) -> bool {
        self.current
            .read()
            .as_ref()
            .map(|p| p.is_expired_at(now, buffer))
            .unwrap_or(true)
    }

    /// Time until hard expiry, zero when expired or empty.
    pub fn time_remaining(&self) -> Duration {
        self.current
            .read()
            .as_ref()
            .map(|p| p.time_remaining_at(Utc::now()))
            .unwrap_or(Duration::ZERO)
    }

    pub fn status(&self, buffer: Duration) -> TokenStatus {
        let now = Utc::now();
        let current = self.current.read();
        match current.as_ref() {
            Some(pair) => TokenStatus {
                has_tokens: true,
                is_expired: pair.is_expired_at(now, buffer),
                time_remaining_secs: pair.time_remaining_at(now).as_secs(),
            },
            None => TokenStatus {
                has_tokens: false,
                is_expired: true,
                time_remaining_secs: 0,
            },
        }
    }
}
