//! # Error Types
//!
//! Domain-specific error types for numis-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  numis-core errors (this file)                                         │
//! │  ├── CoreError        - Field catalog and reference failures           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  numis-db errors (separate crate)                                      │
//! │  └── DbError          - Store file and query failures                  │
//! │                                                                         │
//! │  numis-sync errors (separate crate)                                    │
//! │  └── SyncError        - Merge and configuration failures               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → SyncError → caller      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field name, value type, etc.)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A field name is not part of the collection's field catalog.
    ///
    /// ## When This Occurs
    /// - Filter criteria reference a column that does not exist
    /// - An import hands over a field the schema never had
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// A system-managed field was written through the field map.
    ///
    /// `status`, `createdat` and `updatedat` are maintained by the store.
    #[error("Field {0} is managed by the store and cannot be set directly")]
    SystemField(String),

    /// A value does not fit the declared type of its field.
    ///
    /// ## User Workflow
    /// ```text
    /// Edit coin: year = "nineteen ten"
    ///      │
    ///      ▼
    /// FieldType::Number accepts Integer only
    ///      │
    ///      ▼
    /// TypeMismatch { field: "year", expected: "number", actual: "text" }
    /// ```
    #[error("Field {field} expects {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    /// The field cannot take part in filtering or pick-lists (images).
    #[error("Field {0} cannot be filtered")]
    NotFilterable(String),

    /// Two field definitions share a name.
    #[error("Duplicate field definition: {0}")]
    DuplicateField(String),

    /// Reference bytes could not be read or written.
    #[error("Invalid reference data: {0}")]
    InvalidReference(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when user input doesn't meet requirements.
/// Used for early validation before anything reaches the store.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Invalid format (e.g., invalid UUID, invalid date).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// Two values that must be equal are not (password confirmation).
    #[error("{field} and its confirmation must match")]
    Mismatch { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::TypeMismatch {
            field: "year".to_string(),
            expected: "number".to_string(),
            actual: "text".to_string(),
        };
        assert_eq!(err.to_string(), "Field year expects number, got text");

        let err = CoreError::UnknownField("colour".to_string());
        assert_eq!(err.to_string(), "Unknown field: colour");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "password".to_string(),
        };
        assert_eq!(err.to_string(), "password is required");

        let err = ValidationError::Mismatch {
            field: "password".to_string(),
        };
        assert_eq!(err.to_string(), "password and its confirmation must match");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "title".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
