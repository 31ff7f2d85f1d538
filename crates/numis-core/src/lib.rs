//! # numis-core: Pure Collection Logic for Numis
//!
//! This crate is the **heart** of Numis. It describes what a coin collection
//! is made of, with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Numis Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │               Presentation layer (not in this workspace)        │   │
//! │  │    List view ──► Filters ──► Edit dialog ──► Synchronize       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Store API                              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ numis-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  fields   │  │  filter   │  │ reference │  │   │
//! │  │   │   Item    │  │ FieldType │  │ Criterion │  │ Reference │  │   │
//! │  │   │FieldValue │  │  Catalog  │  │ Predicate │  │   Entry   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    numis-db (Store Layer)                       │   │
//! │  │         SQLite file, migrations, queries, attachments           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Items, field values, statuses, change sets
//! - [`fields`] - Field definitions and the ordered field catalog
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`filter`] - Filter criteria and compiled predicates
//! - [`reference`] - Pick-list reference catalog
//! - [`merge`] - Merge bookkeeping shared by the synchronizer
//! - [`error`] - Domain error types
//! - [`validation`] - Field and input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use numis_core::{FieldCatalog, FieldValue, ItemStatus, NewItem};
//! use numis_core::validation::validate_new_item;
//!
//! let catalog = FieldCatalog::builtin();
//! let coin = NewItem::new(ItemStatus::Owned)
//!     .with("country", FieldValue::text("France"))
//!     .with("year", FieldValue::Integer(1921));
//!
//! assert!(validate_new_item(&catalog, &coin).is_ok());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod fields;
pub mod filter;
pub mod merge;
pub mod money;
pub mod reference;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use numis_core::Money` instead of
// `use numis_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use fields::{FieldCatalog, FieldDefinition, FieldType};
pub use filter::{
    compile, CompiledFilter, FilterCriteria, FilterCriterion, FilterLimits, Predicate,
    SortDirection, SortOrder,
};
pub use merge::{MergeOutcome, MergeReport};
pub use money::Money;
pub use reference::{Reference, ReferenceEntry};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default complexity ceiling for compiled filters.
///
/// Product of the value-set sizes of all multi-value criteria. Above this the
/// filter is ignored and the view falls back to showing everything.
pub const DEFAULT_MAX_FILTER_COMBINATIONS: u64 = 100_000;
