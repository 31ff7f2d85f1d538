//! # Sync Error Types
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Store       │  │     Control             │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Store(DbError) │  │  Cancelled              │ │
//! │  │  ConfigLoad...  │  │                 │  │                         │ │
//! │  │  ConfigSave...  │  │                 │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use numis_db::DbError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to read or parse the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to write the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Merge Errors
    // =========================================================================
    /// A store operation failed during merge.
    #[error(transparent)]
    Store(#[from] DbError),

    /// The merge was cancelled between items.
    #[error("Synchronization cancelled")]
    Cancelled,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl SyncError {
    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_) | SyncError::ConfigLoadFailed(_) | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true for a user cancellation, from the merge loop or the store.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled | SyncError::Store(DbError::Cancelled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(SyncError::InvalidConfig("bad".into()).is_config_error());
        assert!(!SyncError::Cancelled.is_config_error());

        assert!(SyncError::Cancelled.is_cancelled());
        assert!(SyncError::from(DbError::Cancelled).is_cancelled());
        assert!(!SyncError::from(DbError::ReadOnly).is_cancelled());
    }

    #[test]
    fn test_store_errors_display_unchanged() {
        let err = SyncError::from(DbError::ReadOnly);
        assert_eq!(err.to_string(), DbError::ReadOnly.to_string());
    }
}
