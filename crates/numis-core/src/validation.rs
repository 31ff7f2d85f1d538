//! # Validation Module
//!
//! Checks applied to command objects before they reach the store.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (edit dialog, importer)                               │
//! │  └── Parses user input into FieldValue                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Field exists in the catalog                                       │
//! │  ├── Field is not store-managed                                        │
//! │  └── Value matches the field type                                      │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Store (SQLite)                                               │
//! │  ├── NOT NULL constraints                                              │
//! │  └── UNIQUE uid index                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::fields::{FieldCatalog, FieldType};
use crate::types::{FieldValue, ItemChanges, NewItem};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted short string (mint marks).
pub const MAX_SHORT_STRING_LEN: usize = 16;

/// Shortest accepted collection password.
pub const MIN_PASSWORD_LEN: usize = 4;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a field name as it would appear in a column list.
///
/// ## Rules
/// - Must not be empty
/// - Lowercase ASCII letters and digits only, starting with a letter
pub fn validate_field_name(name: &str) -> ValidationResult<()> {
    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "field name".to_string(),
        });
    }

    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    if !starts_with_letter || !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: name.to_string(),
            reason: "must contain only lowercase letters and digits".to_string(),
        });
    }

    Ok(())
}

/// Validates one value written through an item's field map.
pub fn validate_field_value(catalog: &FieldCatalog, name: &str, value: &FieldValue) -> CoreResult<()> {
    let field = catalog.require(name)?;
    if field.system {
        return Err(CoreError::SystemField(name.to_string()));
    }
    if !field.field_type.accepts(value) {
        return Err(CoreError::TypeMismatch {
            field: name.to_string(),
            expected: field.field_type.to_string(),
            actual: value.kind().to_string(),
        });
    }

    if field.field_type == FieldType::ShortString {
        if let FieldValue::Text(text) = value {
            if text.chars().count() > MAX_SHORT_STRING_LEN {
                return Err(ValidationError::TooLong {
                    field: name.to_string(),
                    max: MAX_SHORT_STRING_LEN,
                }
                .into());
            }
        }
    }

    Ok(())
}

// =============================================================================
// Command Validators
// =============================================================================

/// Validates an insert command.
///
/// ## Example
/// ```rust
/// use numis_core::{FieldCatalog, FieldValue, ItemStatus, NewItem};
/// use numis_core::validation::validate_new_item;
///
/// let catalog = FieldCatalog::builtin();
/// let ok = NewItem::new(ItemStatus::Owned).with("year", FieldValue::Integer(1921));
/// assert!(validate_new_item(&catalog, &ok).is_ok());
///
/// let bad = NewItem::new(ItemStatus::Owned).with("year", FieldValue::text("1921"));
/// assert!(validate_new_item(&catalog, &bad).is_err());
/// ```
pub fn validate_new_item(catalog: &FieldCatalog, item: &NewItem) -> CoreResult<()> {
    if let Some(id) = &item.id {
        Uuid::parse_str(id.as_str()).map_err(|e| ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: e.to_string(),
        })?;
    }

    for (name, value) in &item.fields {
        validate_field_value(catalog, name, value)?;
    }

    Ok(())
}

/// Validates an update command.
pub fn validate_changes(catalog: &FieldCatalog, changes: &ItemChanges) -> CoreResult<()> {
    for (name, value) in &changes.set {
        validate_field_value(catalog, name, value)?;
    }

    for name in &changes.clear {
        let field = catalog.require(name)?;
        if field.system {
            return Err(CoreError::SystemField(name.clone()));
        }
    }

    Ok(())
}

// =============================================================================
// Password Validators
// =============================================================================

/// Validates a new collection password against its confirmation.
pub fn validate_new_password(password: &str, confirmation: &str) -> ValidationResult<()> {
    if password.is_empty() {
        return Err(ValidationError::Required {
            field: "password".to_string(),
        });
    }

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::InvalidFormat {
            field: "password".to_string(),
            reason: format!("must be at least {} characters", MIN_PASSWORD_LEN),
        });
    }

    if password != confirmation {
        return Err(ValidationError::Mismatch {
            field: "password".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemId, ItemStatus};

    #[test]
    fn test_validate_field_name() {
        assert!(validate_field_name("catalognum1").is_ok());
        assert!(validate_field_name("").is_err());
        assert!(validate_field_name("1year").is_err());
        assert!(validate_field_name("year; DROP TABLE coins").is_err());
        assert!(validate_field_name("Year").is_err());
    }

    #[test]
    fn test_new_item_rejects_system_fields() {
        let catalog = FieldCatalog::builtin();
        let item = NewItem::new(ItemStatus::Owned).with("status", FieldValue::text("sold"));
        assert!(matches!(
            validate_new_item(&catalog, &item),
            Err(CoreError::SystemField(_))
        ));
    }

    #[test]
    fn test_new_item_rejects_unknown_fields() {
        let catalog = FieldCatalog::builtin();
        let item = NewItem::new(ItemStatus::Owned).with("colour", FieldValue::text("gold"));
        assert!(matches!(
            validate_new_item(&catalog, &item),
            Err(CoreError::UnknownField(_))
        ));
    }

    #[test]
    fn test_new_item_checks_supplied_id() {
        let catalog = FieldCatalog::builtin();
        let mut item = NewItem::new(ItemStatus::Owned);
        item.id = Some(ItemId::from("not-a-uuid"));
        assert!(validate_new_item(&catalog, &item).is_err());

        item.id = Some(ItemId::generate());
        assert!(validate_new_item(&catalog, &item).is_ok());
    }

    #[test]
    fn test_short_string_length() {
        let catalog = FieldCatalog::builtin();
        assert!(validate_field_value(&catalog, "mintmark", &FieldValue::text("CC")).is_ok());
        assert!(validate_field_value(&catalog, "mintmark", &FieldValue::text("X".repeat(40))).is_err());
    }

    #[test]
    fn test_changes_validation() {
        let catalog = FieldCatalog::builtin();
        let ok = ItemChanges::new()
            .set("grade", FieldValue::text("VF"))
            .clear("note");
        assert!(validate_changes(&catalog, &ok).is_ok());

        let bad = ItemChanges::new().clear("createdat");
        assert!(matches!(
            validate_changes(&catalog, &bad),
            Err(CoreError::SystemField(_))
        ));
    }

    #[test]
    fn test_validate_new_password() {
        assert!(validate_new_password("secret", "secret").is_ok());
        assert!(matches!(
            validate_new_password("", ""),
            Err(ValidationError::Required { .. })
        ));
        assert!(validate_new_password("abc", "abc").is_err());
        assert!(matches!(
            validate_new_password("secret", "secreT"),
            Err(ValidationError::Mismatch { .. })
        ));
    }
}
