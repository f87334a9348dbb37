//! Application configuration management.
//!
//! Holds the CMS base URL, the session timing knobs, the sentinel
//! administrator role id, the persistence backend and the last used email.
//!
//! Configuration is stored at `~/.config/opsportal/config.json`; any field can
//! be overridden through `OPSPORTAL_*` environment variables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::auth::{FileStorage, KeyringStorage, SessionOptions, TokenPersistence};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "opsportal";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default CMS address (the stock local development port).
const DEFAULT_BASE_URL: &str = "http://localhost:8055";

/// HTTP request timeout in seconds.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Renew this long before the access token hard-expires.
const DEFAULT_REFRESH_BUFFER_SECS: u64 = 300;

/// How often the background renewal task looks at the token.
const DEFAULT_AUTO_REFRESH_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" | "keychain" => Ok(StorageBackend::Keyring),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub refresh_buffer_secs: u64,
    pub auto_refresh_interval_secs: u64,
    /// Role id that always counts as administrator.
    pub admin_role_id: Option<String>,
    pub storage: StorageBackend,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            refresh_buffer_secs: DEFAULT_REFRESH_BUFFER_SECS,
            auto_refresh_interval_secs: DEFAULT_AUTO_REFRESH_INTERVAL_SECS,
            admin_role_id: None,
            storage: StorageBackend::File,
            last_email: None,
        }
    }
}

impl Config {
    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(path = %path.display(), "Config loaded");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write config file {}", path.display()))?;
        Ok(())
    }

    /// Apply `OPSPORTAL_*` overrides. Unparseable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("OPSPORTAL_URL") {
            self.base_url = url;
        }
        if let Some(role) = lookup("OPSPORTAL_ADMIN_ROLE_ID") {
            self.admin_role_id = Some(role).filter(|r| !r.trim().is_empty());
        }
        Self::override_secs(&lookup, "OPSPORTAL_TIMEOUT_SECS", &mut self.request_timeout_secs);
        Self::override_secs(
            &lookup,
            "OPSPORTAL_REFRESH_BUFFER_SECS",
            &mut self.refresh_buffer_secs,
        );
        Self::override_secs(
            &lookup,
            "OPSPORTAL_REFRESH_INTERVAL_SECS",
            &mut self.auto_refresh_interval_secs,
        );
        if let Some(storage) = lookup("OPSPORTAL_STORAGE") {
            match storage.parse() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring OPSPORTAL_STORAGE"),
            }
        }
    }

    fn override_secs<F>(lookup: &F, key: &str, target: &mut u64)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(key) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => *target = secs,
                Err(_) => warn!(key = key, value = %raw, "Ignoring non-numeric override"),
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn refresh_buffer(&self) -> Duration {
        Duration::from_secs(self.refresh_buffer_secs)
    }

    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_secs.max(1))
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            refresh_buffer: self.refresh_buffer(),
            request_timeout: self.request_timeout(),
            admin_role_id: self.admin_role_id.clone(),
        }
    }

    /// Open the configured persistence backend.
    pub fn open_storage(&self) -> Result<Arc<dyn TokenPersistence>> {
        match self.storage {
            StorageBackend::File => Ok(Arc::new(FileStorage::new(self.cache_dir()?))),
            StorageBackend::Keyring => Ok(Arc::new(KeyringStorage::new(APP_NAME))),
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }
}
