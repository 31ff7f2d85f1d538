//! # numis-db: Collection Store for Numis
//!
//! One collection is one SQLite file, accessed through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Numis Data Flow                                  │
//! │                                                                         │
//! │  List view / edit dialog / import                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     numis-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Store      │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (store.rs)   │    │  (items.rs)   │    │  v1 → v5     │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ Session tx    │    │ ItemRepo      │    │ working copy │  │   │
//! │  │   │ Lock + gate   │◄───│ FieldRepo     │    │ swap on      │  │   │
//! │  │   │ save / close  │    │ SettingsRepo  │    │ success      │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   FilterEngine ── ReferenceAttachments ── backups              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │   collection.db  (settings, coins, fields, attachments)        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`store`] - Opening, creating, editing and saving a collection
//! - [`migrations`] - Versioned schema upgrades
//! - [`filter`] - Filter compilation and application
//! - [`reference`] - Embedded reference attach/detach
//! - [`repository`] - Table-level operations
//! - [`schema`] - Table layout and value encoding
//! - [`error`] - Store error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use numis_core::{FieldValue, ItemStatus, NewItem};
//! use numis_db::Store;
//!
//! let mut store = Store::open("coins.db", None).await?;
//! let id = store
//!     .insert(NewItem::new(ItemStatus::Owned).with("country", FieldValue::text("Italy")))
//!     .await?;
//! store.save().await?;
//! store.close().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backup;
pub mod error;
pub mod filter;
pub mod lock;
pub mod migrations;
pub mod password;
pub mod reference;
pub mod repository;
pub mod schema;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use filter::FilterEngine;
pub use lock::StoreLock;
pub use migrations::{read_version, MigrationStep, Migrator};
pub use reference::{ReferenceAttachments, ReferenceFile, REFERENCE_ATTACHMENT};
pub use repository::ItemStream;
pub use schema::CURRENT_VERSION;
pub use store::{BackupPolicy, DbConfig, Store, StoreTransaction};
