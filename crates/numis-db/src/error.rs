//! # Store Error Types
//!
//! Error types for store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)     std::io::Error     CoreError           │
//! │       │                              │                 │                │
//! │       └──────────────┬───────────────┴─────────────────┘                │
//! │                      ▼                                                  │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller shows "Collection ... not exists", "Incorrect password", ...   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use numis_core::CoreError;
use thiserror::Error;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A file or record does not exist.
    ///
    /// ## When This Occurs
    /// - `open` on a missing file
    /// - `update`/`delete` of an unknown item id
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `create` was pointed at an existing file.
    #[error("Specified file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The file is not a collection (not SQLite, or no version marker).
    #[error("Collection {0} in wrong format")]
    WrongFormat(String),

    /// The file was written by a newer release.
    #[error("Collection format version {found} is newer than supported version {supported}")]
    NewerVersion { found: u32, supported: u32 },

    /// The collection is password protected and the password is missing or wrong.
    #[error("Incorrect password")]
    IncorrectPassword,

    /// A mutation was attempted on a store opened read-only.
    #[error("Collection is opened read-only")]
    ReadOnly,

    /// Another session holds the store lock.
    #[error("Collection is in use by another session: {}", .0.display())]
    Locked(PathBuf),

    /// File system failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// A migration step failed. The original file is untouched.
    #[error("Migration from version {version} failed: {reason}")]
    MigrationFailed { version: u32, reason: String },

    /// Reference could not be embedded. The store is unmodified.
    #[error("Attaching reference failed: {0}")]
    AttachFailed(String),

    /// Reference could not be extracted.
    #[error("Detaching reference failed: {0}")]
    DetachFailed(String),

    /// Reference could not be removed.
    #[error("Clearing reference failed: {0}")]
    ClearFailed(String),

    /// The caller cancelled a long-running operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting an item with an id that is already stored
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The database file could not be opened.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The store has been closed.
    #[error("Collection is closed")]
    Closed,

    /// Domain error (unknown field, type mismatch, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Internal store error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    pub(crate) fn migration(version: u32, reason: impl ToString) -> Self {
        DbError::MigrationFailed {
            version,
            reason: reason.to_string(),
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → UNIQUE constraint / wrong format / QueryFailed
/// sqlx::Error::Io             → DbError::Io
/// sqlx::Error::PoolClosed     → DbError::Closed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: coins.uid"
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("file is not a database") {
                    DbError::WrongFormat(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::Io(io_err) => DbError::Io(io_err.to_string()),

            sqlx::Error::PoolClosed => DbError::Closed,

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(err: std::io::Error) -> Self {
        DbError::Io(err.to_string())
    }
}

/// Result type for store operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(DbError::IncorrectPassword.to_string(), "Incorrect password");
        assert_eq!(
            DbError::WrongFormat("coins.db".into()).to_string(),
            "Collection coins.db in wrong format"
        );
        assert_eq!(
            DbError::migration(3, "boom").to_string(),
            "Migration from version 3 failed: boom"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let err: DbError = std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(matches!(err, DbError::Io(msg) if msg == "disk full"));
    }

    #[test]
    fn test_row_not_found_conversion() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
