//! # Stockroom Configuration
//!
//! Settings shared by the CLI, the sync agent and the backup jobs.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     STOCKROOM_DB_PATH=/srv/shop/inventory.db                           │
//! │     STOCKROOM_REMOTE_URL=https://shop-default-rtdb.firebaseio.com      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/stockroom/stockroom.toml (Linux)                         │
//! │     ~/Library/Application Support/com.stockroom.app/stockroom.toml     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     DB in the platform data dir, remote disabled                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "/srv/shop/inventory.db"
//!
//! [remote]
//! enabled = true
//! url = "https://shop-default-rtdb.firebaseio.com"
//! auth_token = "…"
//! request_timeout_secs = 15
//!
//! [backup]
//! dir = "/srv/shop/backups"
//! max_backups = 5
//! restore_on_start = true
//! upload_on_exit = true
//!
//! [auth]
//! bootstrap_admin_password = "admin123"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use stockroom_core::validation::validate_password;
use stockroom_core::DEFAULT_MAX_BACKUPS;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::remote::FirebaseConfig;

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "stockroom", "app")
}

// =============================================================================
// Database Settings
// =============================================================================

/// Location of the local SQLite file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().join("stockroom.db"))
        .unwrap_or_else(|| PathBuf::from("stockroom.db"))
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
        }
    }
}

// =============================================================================
// Remote Settings
// =============================================================================

/// Realtime remote store connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Mirror to the remote store at all.
    #[serde(default)]
    pub enabled: bool,

    /// Database root URL (http or https).
    #[serde(default)]
    pub url: Option<String>,

    /// Secret or ID token passed as the `auth` query parameter.
    #[serde(default)]
    pub auth_token: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Initial reconnect delay for change streams (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum reconnect delay for change streams (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_request_timeout() -> u64 {
    15
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            enabled: false,
            url: None,
            auth_token: None,
            request_timeout_secs: default_request_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Backup Settings
// =============================================================================

/// Rotating archives and the remote snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Directory holding `backup_*.zip`; defaults to `backups/` next to the DB.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    #[serde(default = "default_max_backups")]
    pub max_backups: usize,

    /// Download the remote snapshot before the database opens.
    #[serde(default = "default_true")]
    pub restore_on_start: bool,

    /// Upload the database snapshot after shutdown.
    #[serde(default = "default_true")]
    pub upload_on_exit: bool,
}

fn default_max_backups() -> usize {
    DEFAULT_MAX_BACKUPS
}

fn default_true() -> bool {
    true
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            dir: None,
            max_backups: default_max_backups(),
            restore_on_start: true,
            upload_on_exit: true,
        }
    }
}

// =============================================================================
// Auth Settings
// =============================================================================

/// Account bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Password given to the `admin` account created on an empty database.
    #[serde(default = "default_admin_password")]
    pub bootstrap_admin_password: String,
}

fn default_admin_password() -> String {
    stockroom_db::pool::DEFAULT_ADMIN_PASSWORD.to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        AuthSettings {
            bootstrap_admin_password: default_admin_password(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StockroomConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub auth: AuthSettings,
}

impl StockroomConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (stockroom.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(format!("{}: {e}", path.display())))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load config, using defaults");
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig("database.path must not be empty".into()));
        }

        if let Some(url) = &self.remote.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(SyncError::InvalidUrl(format!(
                    "Remote URL must start with http:// or https://, got: {url}"
                )));
            }
        }

        if self.remote.enabled && self.remote.url.is_none() {
            return Err(SyncError::InvalidConfig(
                "remote.enabled requires remote.url".into(),
            ));
        }

        if self.backup.max_backups == 0 {
            return Err(SyncError::InvalidConfig(
                "max_backups must be greater than 0".into(),
            ));
        }

        validate_password(&self.auth.bootstrap_admin_password).map_err(|e| {
            SyncError::InvalidConfig(format!("auth.bootstrap_admin_password: {e}"))
        })?;

        Ok(())
    }

    /// Applies environment variable overrides read through `lookup`.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("STOCKROOM_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(url) = lookup("STOCKROOM_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.url = Some(url);
            self.remote.enabled = true;
        }

        if let Some(token) = lookup("STOCKROOM_REMOTE_TOKEN") {
            self.remote.auth_token = Some(token);
        }

        if let Some(enabled) = lookup("STOCKROOM_REMOTE_ENABLED") {
            match enabled.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.remote.enabled = true,
                "0" | "false" | "no" | "off" => self.remote.enabled = false,
                _ => warn!(value = %enabled, "Unknown STOCKROOM_REMOTE_ENABLED value"),
            }
        }

        if let Some(dir) = lookup("STOCKROOM_BACKUP_DIR") {
            self.backup.dir = Some(PathBuf::from(dir));
        }

        if let Some(max) = lookup("STOCKROOM_MAX_BACKUPS") {
            match max.parse::<usize>() {
                Ok(n) => self.backup.max_backups = n,
                Err(_) => warn!(value = %max, "Ignoring non-numeric STOCKROOM_MAX_BACKUPS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("stockroom.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Backup directory, `backups/` beside the database unless configured.
    pub fn backup_dir(&self) -> PathBuf {
        self.backup.dir.clone().unwrap_or_else(|| {
            self.database
                .path
                .parent()
                .map(|p| p.join("backups"))
                .unwrap_or_else(|| PathBuf::from("backups"))
        })
    }

    /// True when a remote store is configured and enabled.
    pub fn is_remote_enabled(&self) -> bool {
        self.remote.enabled && self.remote.url.is_some()
    }

    /// Client settings, `None` while the remote is disabled.
    pub fn firebase_config(&self) -> SyncResult<Option<FirebaseConfig>> {
        let Some(url) = self.remote.url.as_deref().filter(|_| self.remote.enabled) else {
            return Ok(None);
        };

        let config = FirebaseConfig::new(url)?
            .auth_token(self.remote.auth_token.clone())
            .request_timeout(Duration::from_secs(self.remote.request_timeout_secs))
            .backoff(
                Duration::from_millis(self.remote.initial_backoff_ms),
                Duration::from_secs(self.remote.max_backoff_secs),
            );
        Ok(Some(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = StockroomConfig::default();
        assert!(!config.remote.enabled);
        assert_eq!(config.backup.max_backups, 5);
        assert!(config.backup.restore_on_start);
        assert!(config.backup.upload_on_exit);
        assert_eq!(config.auth.bootstrap_admin_password, "admin123");
        assert!(config.database.path.ends_with("stockroom.db"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = StockroomConfig::default();

        config.remote.url = Some("ws://shop.example".into());
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.remote.url = Some("https://shop.firebaseio.com".into());
        config.remote.enabled = true;
        assert!(config.validate().is_ok());

        config.remote.url = None;
        assert!(config.validate().unwrap_err().is_config_error());

        config.remote.enabled = false;
        config.backup.max_backups = 0;
        assert!(config.validate().is_err());

        config.backup.max_backups = 3;
        config.auth.bootstrap_admin_password = "abc".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = StockroomConfig::default();
        config.apply_env_overrides(env(&[
            ("STOCKROOM_DB_PATH", "/tmp/shop.db"),
            ("STOCKROOM_REMOTE_URL", "https://shop.firebaseio.com"),
            ("STOCKROOM_REMOTE_TOKEN", "tok"),
            ("STOCKROOM_BACKUP_DIR", "/tmp/bk"),
            ("STOCKROOM_MAX_BACKUPS", "9"),
        ]));

        assert_eq!(config.database.path, PathBuf::from("/tmp/shop.db"));
        assert!(config.is_remote_enabled());
        assert_eq!(config.remote.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.backup_dir(), PathBuf::from("/tmp/bk"));
        assert_eq!(config.backup.max_backups, 9);

        config.apply_env_overrides(env(&[("STOCKROOM_REMOTE_ENABLED", "off")]));
        assert!(!config.is_remote_enabled());
        assert!(config.firebase_config().unwrap().is_none());
    }

    #[test]
    fn test_backup_dir_defaults_beside_database() {
        let mut config = StockroomConfig::default();
        config.database.path = PathBuf::from("/data/shop/inventory.db");
        assert_eq!(config.backup_dir(), PathBuf::from("/data/shop/backups"));
    }

    #[test]
    fn test_firebase_config_from_settings() {
        let mut config = StockroomConfig::default();
        config.remote.enabled = true;
        config.remote.url = Some("https://shop.firebaseio.com".into());
        config.remote.request_timeout_secs = 3;

        let firebase = config.firebase_config().unwrap().unwrap();
        assert_eq!(firebase.base_url.as_str(), "https://shop.firebaseio.com/");
        assert_eq!(firebase.request_timeout, Duration::from_secs(3));
        assert!(firebase.auth_token.is_none());
    }

    #[test]
    fn test_load_and_save_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("stockroom.toml");

        let mut config = StockroomConfig::default();
        config.database.path = dir.path().join("inventory.db");
        config.backup.max_backups = 2;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[database]"));
        assert!(contents.contains("[backup]"));

        let loaded: StockroomConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: StockroomConfig = toml::from_str("[backup]\nmax_backups = 7\n").unwrap();
        assert_eq!(config.backup.max_backups, 7);
        assert!(config.backup.upload_on_exit);
        assert!(!config.remote.enabled);
    }

    #[test]
    fn test_malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockroom.toml");
        std::fs::write(&path, "[backup\nmax_backups = ").unwrap();
        assert!(StockroomConfig::load(Some(path)).unwrap_err().is_config_error());
    }
}
