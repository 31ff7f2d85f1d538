//! # Domain Types
//!
//! Core domain types used throughout Numis.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Item       │   │   FieldValue    │   │   ItemStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  Text           │   │  Demo  Pass     │       │
//! │  │  status         │──►│  Integer / Real │   │  Owned Ordered  │       │
//! │  │  fields (map)   │   │  Money          │   │  Sold  Sale     │       │
//! │  │  created_at     │   │  Date/DateTime  │   │  Wish           │       │
//! │  │  updated_at     │   │  Image (bytes)  │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                              │
//! │  │    NewItem      │   │   ItemChanges   │   Command objects handed    │
//! │  │  (insert)       │   │  (update)       │   to the store              │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every item carries a UUID v4 identifier that never changes. Merging two
//! collections matches items by that identifier, so it must survive export,
//! import and migration untouched.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::fields::{FIELD_CREATED_AT, FIELD_STATUS, FIELD_UPDATED_AT};
use crate::money::Money;

// =============================================================================
// Item Identifier
// =============================================================================

/// Stable identifier of a collection item.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Generates a fresh UUID v4 identifier.
    pub fn generate() -> Self {
        ItemId(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ItemId {
    fn from(id: String) -> Self {
        ItemId(id)
    }
}

impl From<&str> for ItemId {
    fn from(id: &str) -> Self {
        ItemId(id.to_string())
    }
}

// =============================================================================
// Item Status
// =============================================================================

/// Where a coin stands in the collector's life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    /// Sample data shipped with a new collection.
    Demo,
    /// Seen and deliberately passed on.
    Pass,
    /// In the collection.
    #[default]
    Owned,
    /// Bought, not yet received.
    Ordered,
    /// Was in the collection, sold.
    Sold,
    /// Offered for sale.
    Sale,
    /// Wanted.
    Wish,
}

impl ItemStatus {
    /// All statuses in display order.
    pub const ALL: [ItemStatus; 7] = [
        ItemStatus::Demo,
        ItemStatus::Pass,
        ItemStatus::Owned,
        ItemStatus::Ordered,
        ItemStatus::Sold,
        ItemStatus::Sale,
        ItemStatus::Wish,
    ];

    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Demo => "demo",
            ItemStatus::Pass => "pass",
            ItemStatus::Owned => "owned",
            ItemStatus::Ordered => "ordered",
            ItemStatus::Sold => "sold",
            ItemStatus::Sale => "sale",
            ItemStatus::Wish => "wish",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::NotAllowed {
                field: FIELD_STATUS.to_string(),
                allowed: ItemStatus::ALL.iter().map(|s| s.as_str().to_string()).collect(),
            })
    }
}

// =============================================================================
// Field Value
// =============================================================================

/// A typed value stored in one field of an item.
///
/// A field that is absent from an item's map is blank (NULL in the store).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Free text (names, notes, places).
    Text(String),
    /// Whole numbers (year, mintage, fineness).
    Integer(i64),
    /// Measurements (diameter, thick, mass).
    Real(f64),
    /// Face value and prices.
    Money(Money),
    /// Calendar dates (issue, purchase, sale).
    Date(NaiveDate),
    /// Timestamps.
    DateTime(DateTime<Utc>),
    /// Encoded image bytes (obverse, reverse).
    Image(Vec<u8>),
}

impl FieldValue {
    /// Shorthand for a text value.
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    /// Human-readable name of the variant, used in error messages.
    pub const fn kind(&self) -> &'static str {
        match self {
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Real(_) => "real",
            FieldValue::Money(_) => "money",
            FieldValue::Date(_) => "date",
            FieldValue::DateTime(_) => "datetime",
            FieldValue::Image(_) => "image",
        }
    }

    /// Empty text and empty images count as blank, same as a missing value.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Image(bytes) => bytes.is_empty(),
            _ => false,
        }
    }

    /// Returns the text content for free-text matching.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Real(x) => write!(f, "{}", x),
            FieldValue::Money(m) => write!(f, "{}", m),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::DateTime(t) => write!(f, "{}", t.to_rfc3339()),
            FieldValue::Image(bytes) => write!(f, "<image {} bytes>", bytes.len()),
        }
    }
}

// =============================================================================
// Item
// =============================================================================

/// One coin in the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique identifier (UUID v4).
    pub id: ItemId,

    /// Life-cycle status.
    pub status: ItemStatus,

    /// User fields keyed by field name. Missing keys are blank.
    pub fields: BTreeMap<String, FieldValue>,

    /// When the item was first stored.
    pub created_at: DateTime<Utc>,

    /// When the item was last changed.
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Returns a user field value.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Returns any field value, including the store-managed ones.
    ///
    /// `status` is exposed as text so that it can be filtered like any
    /// other column.
    pub fn value(&self, name: &str) -> Option<Cow<'_, FieldValue>> {
        match name {
            FIELD_STATUS => Some(Cow::Owned(FieldValue::text(self.status.as_str()))),
            FIELD_CREATED_AT => Some(Cow::Owned(FieldValue::DateTime(self.created_at))),
            FIELD_UPDATED_AT => Some(Cow::Owned(FieldValue::DateTime(self.updated_at))),
            _ => self.fields.get(name).map(Cow::Borrowed),
        }
    }

    /// Compares status and fields, ignoring identity and timestamps.
    ///
    /// Blank values are treated as absent, so `Text("")` equals a missing key.
    pub fn same_content(&self, other: &Item) -> bool {
        if self.status != other.status {
            return false;
        }
        let non_blank = |item: &Item| -> Vec<(String, FieldValue)> {
            item.fields
                .iter()
                .filter(|(_, v)| !v.is_blank())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        non_blank(self) == non_blank(other)
    }
}

// =============================================================================
// Command Objects
// =============================================================================

/// Insert command for the store.
///
/// ## Usage
/// ```rust
/// use numis_core::{FieldValue, ItemStatus, NewItem};
///
/// let coin = NewItem::new(ItemStatus::Wish)
///     .with("title", FieldValue::text("5 francs"))
///     .with("year", FieldValue::Integer(1960));
/// assert!(coin.id.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewItem {
    /// Identifier to keep; generated when `None`.
    pub id: Option<ItemId>,

    /// Initial status.
    pub status: ItemStatus,

    /// Initial field values.
    pub fields: BTreeMap<String, FieldValue>,

    /// Creation time to keep; the insert time when `None`.
    pub created_at: Option<DateTime<Utc>>,

    /// Modification time to keep; the insert time when `None`.
    pub updated_at: Option<DateTime<Utc>>,
}

impl NewItem {
    /// Creates an empty insert command with the given status.
    pub fn new(status: ItemStatus) -> Self {
        NewItem {
            status,
            ..Default::default()
        }
    }

    /// Sets a field value.
    pub fn with(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// Copies an existing item verbatim, identity and timestamps included.
impl From<Item> for NewItem {
    fn from(item: Item) -> Self {
        NewItem {
            id: Some(item.id),
            status: item.status,
            fields: item.fields,
            created_at: Some(item.created_at),
            updated_at: Some(item.updated_at),
        }
    }
}

/// Update command for the store.
///
/// Fields that are neither set nor cleared keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemChanges {
    /// Fields to overwrite.
    pub set: BTreeMap<String, FieldValue>,

    /// Fields to blank out.
    pub clear: BTreeSet<String>,

    /// New status, if changing.
    pub status: Option<ItemStatus>,
}

impl ItemChanges {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites a field.
    pub fn set(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        let name = name.into();
        self.clear.remove(&name);
        self.set.insert(name, value);
        self
    }

    /// Blanks a field.
    pub fn clear(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.set.remove(&name);
        self.clear.insert(name);
        self
    }

    /// Changes the status.
    pub fn status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// True if applying this change set would not touch anything.
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.clear.is_empty() && self.status.is_none()
    }
}

// =============================================================================
// Query Results
// =============================================================================

/// Distinct values of one column, as shown in a filter pick-list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistinctValues {
    /// Non-blank values in ascending order.
    pub values: Vec<FieldValue>,

    /// Whether at least one item has this field blank ("(Blanks)" entry).
    pub has_blank: bool,
}

/// Collection-wide counts and totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionSummary {
    /// Number of items.
    pub total: u64,

    /// Number of items per status. Statuses with no items are absent.
    pub by_status: BTreeMap<ItemStatus, u64>,

    /// Sum of `totalpayprice` over all items.
    pub total_paid: Money,

    /// Sum of `totalsaleprice` over all items.
    pub total_sold: Money,

    /// Sum of `value` over owned items.
    pub owned_value: Money,

    /// Sum of `value` over wished items.
    pub wish_value: Money,
}

impl CollectionSummary {
    /// Number of items with the given status.
    pub fn count(&self, status: ItemStatus) -> u64 {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    /// Sale proceeds minus purchase spending. Negative when more was spent.
    pub fn balance(&self) -> Money {
        self.total_sold - self.total_paid
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
