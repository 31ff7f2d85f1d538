//! # Configuration
//!
//! User settings for opening, filtering, merging and backing up collections.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     NUMIS_READ_ONLY=true                                               │
//! │     NUMIS_BACKUP_DIR=/mnt/backups                                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/numis/numis.toml (Linux)                                 │
//! │     ~/Library/Application Support/org.numis.numis/numis.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! read_only = false
//! busy_timeout_secs = 5
//!
//! [filter]
//! max_combinations = 100000
//!
//! [sync]
//! progress_every = 100
//!
//! [backup]
//! dir = "/home/me/coins/backup"
//! changes_before_backup = 25
//! ```

use std::path::PathBuf;
use std::time::Duration;

use numis_core::{FilterLimits, DEFAULT_MAX_FILTER_COMBINATIONS};
use numis_db::{BackupPolicy, DbConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sections
// =============================================================================

/// How collections are opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Open collections without write access.
    #[serde(default)]
    pub read_only: bool,

    /// How long to wait on a busy collection file (seconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

fn default_busy_timeout() -> u64 {
    5
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            read_only: false,
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

/// Filter behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSettings {
    /// Combination count above which a filter is ignored.
    #[serde(default = "default_max_combinations")]
    pub max_combinations: u64,
}

fn default_max_combinations() -> u64 {
    DEFAULT_MAX_FILTER_COMBINATIONS
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            max_combinations: default_max_combinations(),
        }
    }
}

/// Merge behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Log progress every N merged items.
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

fn default_progress_every() -> u64 {
    100
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            progress_every: default_progress_every(),
        }
    }
}

/// Automatic backups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Backup directory. Autobackup is off without one.
    #[serde(default = "default_backup_dir")]
    pub dir: Option<PathBuf>,

    /// Saved changes between autobackups. 0 disables autobackup.
    #[serde(default = "default_changes_before_backup")]
    pub changes_before_backup: u64,
}

fn default_backup_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("backup"))
}

fn default_changes_before_backup() -> u64 {
    25
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            dir: default_backup_dir(),
            changes_before_backup: default_changes_before_backup(),
        }
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("org", "numis", "numis")
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumisConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub filter: FilterSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub backup: BackupSettings,
}

impl NumisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (numis.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_toml(contents: &str) -> SyncResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.store.busy_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "busy_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.filter.max_combinations == 0 {
            return Err(SyncError::InvalidConfig(
                "max_combinations must be greater than 0".into(),
            ));
        }

        if self.sync.progress_every == 0 {
            return Err(SyncError::InvalidConfig(
                "progress_every must be greater than 0".into(),
            ));
        }

        if let Some(ref dir) = self.backup.dir {
            if dir.as_os_str().is_empty() {
                return Err(SyncError::InvalidConfig("backup dir must not be empty".into()));
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from a variable lookup. Unparseable values are
    /// logged and skipped.
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(value) = var("NUMIS_READ_ONLY") {
            match value.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.store.read_only = true,
                "0" | "false" | "no" => self.store.read_only = false,
                _ => warn!(value = %value, "Unknown NUMIS_READ_ONLY value in environment"),
            }
        }

        if let Some(dir) = var("NUMIS_BACKUP_DIR") {
            debug!(dir = %dir, "Overriding backup dir from environment");
            self.backup.dir = if dir.is_empty() { None } else { Some(PathBuf::from(dir)) };
        }

        if let Some(changes) = var("NUMIS_AUTOBACKUP_CHANGES") {
            match changes.parse::<u64>() {
                Ok(n) => self.backup.changes_before_backup = n,
                Err(_) => warn!(value = %changes, "Invalid NUMIS_AUTOBACKUP_CHANGES in environment"),
            }
        }

        if let Some(max) = var("NUMIS_FILTER_MAX_COMBINATIONS") {
            match max.parse::<u64>() {
                Ok(n) => self.filter.max_combinations = n,
                Err(_) => warn!(value = %max, "Invalid NUMIS_FILTER_MAX_COMBINATIONS in environment"),
            }
        }

        if let Some(every) = var("NUMIS_SYNC_PROGRESS_EVERY") {
            match every.parse::<u64>() {
                Ok(n) => self.sync.progress_every = n,
                Err(_) => warn!(value = %every, "Invalid NUMIS_SYNC_PROGRESS_EVERY in environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("numis.toml"))
    }

    // =========================================================================
    // Conversions
    // =========================================================================

    /// Store settings for `Store::open_with`.
    pub fn db_config(&self) -> DbConfig {
        let mut config = DbConfig::new()
            .read_only(self.store.read_only)
            .busy_timeout(Duration::from_secs(self.store.busy_timeout_secs));
        config.backup = BackupPolicy {
            dir: self.backup.dir.clone(),
            changes_before_backup: self.backup.changes_before_backup,
        };
        config
    }

    pub fn filter_limits(&self) -> FilterLimits {
        FilterLimits {
            max_combinations: self.filter.max_combinations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = NumisConfig::default();
        assert!(!config.store.read_only);
        assert_eq!(config.filter.max_combinations, DEFAULT_MAX_FILTER_COMBINATIONS);
        assert_eq!(config.backup.changes_before_backup, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = NumisConfig::from_toml(
            r#"
            [filter]
            max_combinations = 500

            [backup]
            changes_before_backup = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.filter.max_combinations, 500);
        assert_eq!(config.backup.changes_before_backup, 0);
        assert_eq!(config.store.busy_timeout_secs, 5);
        assert_eq!(config.sync.progress_every, 100);
    }

    #[test]
    fn test_bad_file_is_a_load_error() {
        let err = NumisConfig::from_toml("[filter]\nmax_combinations = \"many\"").unwrap_err();
        assert!(err.is_config_error());
    }

    #[test]
    fn test_config_validation() {
        let mut config = NumisConfig::default();
        config.sync.progress_every = 0;
        assert!(config.validate().is_err());

        config.sync.progress_every = 10;
        config.filter.max_combinations = 0;
        assert!(config.validate().is_err());

        config.filter.max_combinations = 10;
        config.backup.dir = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("NUMIS_READ_ONLY", "true"),
            ("NUMIS_BACKUP_DIR", "/srv/backup"),
            ("NUMIS_AUTOBACKUP_CHANGES", "7"),
            ("NUMIS_FILTER_MAX_COMBINATIONS", "not a number"),
        ]
        .into_iter()
        .collect();

        let mut config = NumisConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert!(config.store.read_only);
        assert_eq!(config.backup.dir, Some(PathBuf::from("/srv/backup")));
        assert_eq!(config.backup.changes_before_backup, 7);
        assert_eq!(config.filter.max_combinations, DEFAULT_MAX_FILTER_COMBINATIONS);
    }

    #[test]
    fn test_db_config_conversion() {
        let mut config = NumisConfig::default();
        config.store.read_only = true;
        config.store.busy_timeout_secs = 2;
        config.backup.dir = Some(PathBuf::from("/tmp/b"));

        let db = config.db_config();
        assert!(db.read_only);
        assert_eq!(db.busy_timeout, Duration::from_secs(2));
        assert_eq!(db.backup.dir, Some(PathBuf::from("/tmp/b")));
        assert_eq!(config.filter_limits().max_combinations, DEFAULT_MAX_FILTER_COMBINATIONS);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("numis.toml");

        let mut config = NumisConfig::default();
        config.sync.progress_every = 3;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[sync]"));
        assert_eq!(NumisConfig::from_toml(&contents).unwrap(), config);
    }
}
