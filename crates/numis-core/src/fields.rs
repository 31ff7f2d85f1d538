//! # Field Catalog
//!
//! Describes the columns a collection is made of.
//!
//! ## Catalog Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  FieldCatalog (ordered, names unique)                                  │
//! │                                                                         │
//! │  position  name          type         enabled  system                  │
//! │  ───────── ───────────── ──────────── ──────── ───────                  │
//! │  0         title         String       yes      no                      │
//! │  1         value         Money        yes      no                      │
//! │  ...                                                                   │
//! │  12        status        Status       yes      YES                     │
//! │  ...                                                                   │
//! │  68        createdat     DateTime     yes      YES                     │
//! │  69        updatedat     DateTime     yes      YES                     │
//! │                                                                         │
//! │  Order of definition = default display order                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Definitions are created when the schema is loaded and only their title
//! and flags change afterwards. They are never deleted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::types::FieldValue;

/// Column holding the item status.
pub const FIELD_STATUS: &str = "status";
/// Column holding the creation timestamp.
pub const FIELD_CREATED_AT: &str = "createdat";
/// Column holding the modification timestamp.
pub const FIELD_UPDATED_AT: &str = "updatedat";

// =============================================================================
// Field Type
// =============================================================================

/// Value type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    ShortString,
    Number,
    Text,
    Money,
    Date,
    BigInt,
    Image,
    Value,
    Status,
    DateTime,
}

impl FieldType {
    const ALL: [FieldType; 11] = [
        FieldType::String,
        FieldType::ShortString,
        FieldType::Number,
        FieldType::Text,
        FieldType::Money,
        FieldType::Date,
        FieldType::BigInt,
        FieldType::Image,
        FieldType::Value,
        FieldType::Status,
        FieldType::DateTime,
    ];

    /// Name stored in the `fields` table.
    pub const fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::ShortString => "short_string",
            FieldType::Number => "number",
            FieldType::Text => "text",
            FieldType::Money => "money",
            FieldType::Date => "date",
            FieldType::BigInt => "big_int",
            FieldType::Image => "image",
            FieldType::Value => "value",
            FieldType::Status => "status",
            FieldType::DateTime => "date_time",
        }
    }

    /// SQLite column affinity.
    ///
    /// Money is stored as INTEGER cents, dates as ISO-8601 text.
    pub const fn sql_type(&self) -> &'static str {
        match self {
            FieldType::String
            | FieldType::ShortString
            | FieldType::Text
            | FieldType::Status
            | FieldType::Date
            | FieldType::DateTime => "TEXT",
            FieldType::Number | FieldType::BigInt | FieldType::Money => "INTEGER",
            FieldType::Value => "REAL",
            FieldType::Image => "BLOB",
        }
    }

    /// Whether a value of this kind may be stored in a field of this type.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (
                FieldType::String | FieldType::ShortString | FieldType::Text | FieldType::Status,
                FieldValue::Text(_)
            ) | (FieldType::Number | FieldType::BigInt, FieldValue::Integer(_))
                | (FieldType::Value, FieldValue::Real(_))
                | (FieldType::Money, FieldValue::Money(_))
                | (FieldType::Date, FieldValue::Date(_))
                | (FieldType::DateTime, FieldValue::DateTime(_))
                | (FieldType::Image, FieldValue::Image(_))
        )
    }

    /// Free-text fields, the only ones `Contains` filters apply to.
    pub const fn is_textual(&self) -> bool {
        matches!(
            self,
            FieldType::String | FieldType::ShortString | FieldType::Text | FieldType::Status
        )
    }

    /// Images cannot be compared, filtered or listed.
    pub const fn is_filterable(&self) -> bool {
        !matches!(self, FieldType::Image)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ValidationError::NotAllowed {
                field: "type".to_string(),
                allowed: FieldType::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Field Definition
// =============================================================================

/// One column of the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Column name, unique within the catalog.
    pub name: String,

    /// Display title, editable by the user.
    pub title: String,

    /// Value type.
    pub field_type: FieldType,

    /// Disabled fields are hidden from edit dialogs.
    pub enabled: bool,

    /// Whether the list view shows the column.
    pub visible: bool,

    /// Maintained by the store, never written through the field map.
    pub system: bool,
}

impl FieldDefinition {
    /// Creates an enabled, visible user field.
    pub fn new(name: impl Into<String>, title: impl Into<String>, field_type: FieldType) -> Self {
        FieldDefinition {
            name: name.into(),
            title: title.into(),
            field_type,
            enabled: true,
            visible: true,
            system: false,
        }
    }

    fn system(name: &str, title: &str, field_type: FieldType) -> Self {
        FieldDefinition {
            system: true,
            ..FieldDefinition::new(name, title, field_type)
        }
    }
}

// =============================================================================
// Builtin Field Groups
// =============================================================================

type FieldSpec = (&'static str, &'static str, FieldType);

const MAIN_FIELDS: &[FieldSpec] = &[
    ("title", "Name", FieldType::String),
    ("value", "Value", FieldType::Money),
    ("unit", "Unit", FieldType::String),
    ("country", "Country", FieldType::String),
    ("year", "Year", FieldType::Number),
    ("period", "Period", FieldType::String),
    ("mint", "Mint", FieldType::String),
    ("mintmark", "Mint mark", FieldType::ShortString),
    ("issuedate", "Date of issue", FieldType::Date),
    ("type", "Type", FieldType::String),
    ("series", "Series", FieldType::String),
    ("subjectshort", "Subject", FieldType::String),
];

const PARAMETER_FIELDS: &[FieldSpec] = &[
    ("metal", "Metal", FieldType::String),
    ("fineness", "Fineness", FieldType::Number),
    ("form", "Form", FieldType::String),
    ("diameter", "Diameter", FieldType::Value),
    ("thick", "Thick", FieldType::Value),
    ("mass", "Mass", FieldType::Value),
    ("grade", "Grade", FieldType::String),
    ("edge", "Edge type", FieldType::String),
    ("edgelabel", "Edge label", FieldType::String),
    ("obvrev", "ObvRev", FieldType::String),
];

const MINTING_FIELDS: &[FieldSpec] = &[
    ("quality", "Quality", FieldType::String),
    ("mintage", "Mintage", FieldType::BigInt),
    ("dateemis", "Emission period", FieldType::String),
];

const CATALOG_FIELDS: &[FieldSpec] = &[
    ("catalognum1", "1#", FieldType::String),
    ("catalognum2", "2#", FieldType::String),
    ("catalognum3", "3#", FieldType::String),
    ("catalognum4", "4#", FieldType::String),
    ("rarity", "Rarity", FieldType::String),
    ("price1", "Fine", FieldType::Money),
    ("price2", "VF", FieldType::Money),
    ("price3", "XF", FieldType::Money),
    ("price4", "Unc", FieldType::Money),
];

const VARIETY_FIELDS: &[FieldSpec] = &[
    ("variety", "Variety", FieldType::String),
    ("obversevar", "Obverse variety", FieldType::String),
    ("reversevar", "Reverse variety", FieldType::String),
    ("edgevar", "Edge variety", FieldType::String),
];

const PURCHASE_FIELDS: &[FieldSpec] = &[
    ("paydate", "Pay date", FieldType::Date),
    ("payprice", "Pay price", FieldType::Money),
    ("totalpayprice", "Paid", FieldType::Money),
    ("saller", "Saller", FieldType::String),
    ("payplace", "Pay place", FieldType::String),
    ("payinfo", "Pay info", FieldType::Text),
];

const SALE_FIELDS: &[FieldSpec] = &[
    ("saledate", "Sale date", FieldType::Date),
    ("saleprice", "Sale price", FieldType::Money),
    ("totalsaleprice", "Bailed", FieldType::Money),
    ("buyer", "Buyer", FieldType::String),
    ("saleplace", "Sale place", FieldType::String),
    ("saleinfo", "Sale info", FieldType::Text),
];

/// Note, main image and the obverse/reverse/edge descriptions.
const DESIGN_FIELDS: &[FieldSpec] = &[
    ("note", "Note", FieldType::Text),
    ("image", "Image", FieldType::Image),
    ("obverseimg", "Obverse", FieldType::Image),
    ("obversedesign", "Obverse design", FieldType::Text),
    ("obversedesigner", "Obverse designer", FieldType::String),
    ("reverseimg", "Reverse", FieldType::Image),
    ("reversedesign", "Reverse design", FieldType::Text),
    ("reversedesigner", "Reverse designer", FieldType::String),
    ("edgeimg", "Edge", FieldType::Image),
    ("subject", "Subject description", FieldType::Text),
];

const PHOTO_FIELDS: &[FieldSpec] = &[
    ("photo1", "Photo 1", FieldType::Image),
    ("photo2", "Photo 2", FieldType::Image),
    ("photo3", "Photo 3", FieldType::Image),
    ("photo4", "Photo 4", FieldType::Image),
];

const STORAGE_FIELDS: &[FieldSpec] = &[
    ("defect", "Defect", FieldType::String),
    ("storage", "Storage", FieldType::String),
    ("features", "Features", FieldType::Text),
];

/// User fields plus `status`, `createdat` and `updatedat`.
const BUILTIN_LEN: usize = MAIN_FIELDS.len()
    + PARAMETER_FIELDS.len()
    + MINTING_FIELDS.len()
    + CATALOG_FIELDS.len()
    + VARIETY_FIELDS.len()
    + PURCHASE_FIELDS.len()
    + SALE_FIELDS.len()
    + DESIGN_FIELDS.len()
    + PHOTO_FIELDS.len()
    + STORAGE_FIELDS.len()
    + 3;

// =============================================================================
// Field Catalog
// =============================================================================

/// Ordered set of field definitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldCatalog {
    fields: Vec<FieldDefinition>,
}

impl FieldCatalog {
    /// The field set every new collection starts with.
    ///
    /// Groups follow the edit dialog, in display order. `status` sits
    /// between the main block and the physical parameters.
    pub fn builtin() -> Self {
        fn user(group: &[FieldSpec]) -> impl Iterator<Item = FieldDefinition> + '_ {
            group
                .iter()
                .map(|(name, title, ty)| FieldDefinition::new(*name, *title, *ty))
        }

        let mut fields = Vec::with_capacity(BUILTIN_LEN);
        fields.extend(user(MAIN_FIELDS));
        fields.push(FieldDefinition::system(FIELD_STATUS, "Status", FieldType::Status));
        for group in [
            PARAMETER_FIELDS,
            MINTING_FIELDS,
            CATALOG_FIELDS,
            VARIETY_FIELDS,
            PURCHASE_FIELDS,
            SALE_FIELDS,
            DESIGN_FIELDS,
            PHOTO_FIELDS,
            STORAGE_FIELDS,
        ] {
            fields.extend(user(group));
        }
        fields.push(FieldDefinition::system(FIELD_CREATED_AT, "Created at", FieldType::DateTime));
        fields.push(FieldDefinition::system(FIELD_UPDATED_AT, "Updated at", FieldType::DateTime));

        FieldCatalog { fields }
    }

    /// Builds a catalog from stored definitions, keeping their order.
    ///
    /// Names become column names, so each must pass
    /// [`validate_field_name`](crate::validation::validate_field_name).
    pub fn from_definitions(fields: Vec<FieldDefinition>) -> CoreResult<Self> {
        for (i, field) in fields.iter().enumerate() {
            crate::validation::validate_field_name(&field.name)?;
            if fields[..i].iter().any(|f| f.name == field.name) {
                return Err(CoreError::DuplicateField(field.name.clone()));
            }
        }
        Ok(FieldCatalog { fields })
    }

    /// Looks a field up by name.
    pub fn get(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Like [`get`](Self::get), failing with `UnknownField`.
    pub fn require(&self, name: &str) -> CoreResult<&FieldDefinition> {
        self.get(name)
            .ok_or_else(|| CoreError::UnknownField(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All definitions in display order.
    pub fn iter(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter()
    }

    /// Definitions stored in an item's field map.
    pub fn user_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| !f.system)
    }

    /// Names of the money columns.
    pub fn money_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.field_type == FieldType::Money)
            .map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Enables or disables a user field.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> CoreResult<()> {
        let field = self.get_mut(name)?;
        if field.system && !enabled {
            return Err(CoreError::SystemField(name.to_string()));
        }
        field.enabled = enabled;
        Ok(())
    }

    /// Renames a field's display title.
    pub fn set_title(&mut self, name: &str, title: &str) -> CoreResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ValidationError::Required {
                field: "title".to_string(),
            }
            .into());
        }
        self.get_mut(name)?.title = title.to_string();
        Ok(())
    }

    fn get_mut(&mut self, name: &str) -> CoreResult<&mut FieldDefinition> {
        self.fields
            .iter_mut()
            .find(|f| f.name == name)
            .ok_or_else(|| CoreError::UnknownField(name.to_string()))
    }
}

impl Default for FieldCatalog {
    fn default() -> Self {
        FieldCatalog::builtin()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
