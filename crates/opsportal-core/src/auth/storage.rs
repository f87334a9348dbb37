use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use keyring::Entry;
use parking_lot::Mutex;

use crate::models::TokenPair;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Keychain account under which the token pair is kept
const KEYRING_ACCOUNT: &str = "session";

/// Durable home of the token pair.
///
/// Implementations replace the stored pair as a unit: a reader sees the old
/// pair, the new pair, or nothing.
pub trait TokenPersistence: Send + Sync {
    fn load(&self) -> Result<Option<TokenPair>>;
    fn store(&self, pair: &TokenPair) -> Result<()>;
    fn remove(&self) -> Result<()>;
}

/// JSON file in the cache directory.
pub struct FileStorage {
    cache_dir: PathBuf,
}

impl FileStorage {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl TokenPersistence for FileStorage {
    fn load(&self) -> Result<Option<TokenPair>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).context("Failed to read session file")?;
        let pair = serde_json::from_str(&contents).context("Failed to parse session file")?;
        Ok(Some(pair))
    }

    fn store(&self, pair: &TokenPair) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir).context("Failed to create cache directory")?;
        let contents = serde_json::to_string_pretty(pair)?;

        // Write a sibling then rename over the real file
        let tmp = self.cache_dir.join(format!("{}.tmp", SESSION_FILE));
        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp).context("Failed to create session file")?;
        #[cfg(unix)]
        {
            // A leftover tmp from an older build keeps its mode through open
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .context("Failed to restrict session file permissions")?;
        }
        file.write_all(contents.as_bytes())
            .context("Failed to write session file")?;
        file.sync_all().context("Failed to flush session file")?;
        drop(file);
        std::fs::rename(&tmp, self.session_path()).context("Failed to replace session file")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// OS keychain entry holding the pair as JSON.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, KEYRING_ACCOUNT).context("Failed to create keyring entry")
    }
}

impl TokenPersistence for KeyringStorage {
    fn load(&self) -> Result<Option<TokenPair>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let pair = serde_json::from_str(&json)
                    .context("Failed to parse session stored in keychain")?;
                Ok(Some(pair))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn store(&self, pair: &TokenPair) -> Result<()> {
        let json = serde_json::to_string(pair)?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store session in keychain")
    }

    fn remove(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

/// Shared in-memory slot. Clones see the same slot, so two stores built on
/// clones behave like two processes sharing one disk.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `store`/`remove` calls fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().clone()
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            anyhow::bail!("storage is read-only");
        }
        Ok(())
    }
}

impl TokenPersistence for MemoryStorage {
    fn load(&self) -> Result<Option<TokenPair>> {
        match self.slot.lock().as_deref() {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    fn store(&self, pair: &TokenPair) -> Result<()> {
        self.check_writable()?;
        let json = serde_json::to_string(pair)?;
        *self.slot.lock() = Some(json);
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        self.check_writable()?;
        *self.slot.lock() = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn sample_pair() -> TokenPair {
        TokenPair {
            access_token: "access-1".to_string(),
            refresh_token: "refresh-1".to_string(),
            expires_at: Utc::now() + Duration::minutes(15),
        }
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("cache"));
        assert!(storage.load().unwrap().is_none());

        let pair = sample_pair();
        storage.store(&pair).unwrap();
        assert_eq!(storage.load().unwrap(), Some(pair));
        assert!(!dir.path().join("cache").join("session.json.tmp").exists());
    }

    #[test]
    fn test_file_storage_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        storage.store(&sample_pair()).unwrap();

        storage.remove().unwrap();
        storage.remove().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_file_storage_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "{not json").unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        assert!(storage.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().to_path_buf());
        storage.store(&sample_pair()).unwrap();

        let mode = std::fs::metadata(dir.path().join(SESSION_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_file_storage_never_writes_through_open_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tmp = dir.path().join(format!("{}.tmp", SESSION_FILE));
        std::fs::write(&tmp, "leftover").unwrap();
        std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o644)).unwrap();

        let storage = FileStorage::new(dir.path().to_path_buf());
        let pair = sample_pair();
        storage.store(&pair).unwrap();

        let mode = std::fs::metadata(dir.path().join(SESSION_FILE))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!tmp.exists());
        assert_eq!(storage.load().unwrap(), Some(pair));
    }

    #[test]
    fn test_memory_storage_clones_share_slot() {
        let a = MemoryStorage::new();
        let b = a.clone();
        let pair = sample_pair();

        a.store(&pair).unwrap();
        assert_eq!(b.load().unwrap(), Some(pair));

        b.remove().unwrap();
        assert!(a.load().unwrap().is_none());
    }

    #[test]
    fn test_memory_storage_failing_writes() {
        let storage = MemoryStorage::new();
        storage.set_fail_writes(true);
        assert!(storage.store(&sample_pair()).is_err());
        assert!(storage.raw().is_none());
    }
}
