//! # Repository Module
//!
//! Table-level operations behind the [`Store`](crate::Store) API.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repositories on the Session                          │
//! │                                                                         │
//! │  Store (owns the session transaction)                                  │
//! │       │                                                                 │
//! │       │  store.insert(item)                                            │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  ItemRepository::new(&mut session, &catalog)                           │
//! │  ├── insert / get / update / replace / delete                          │
//! │  ├── query (lazy stream)                                               │
//! │  └── distinct_values / summary                                         │
//! │       │                                                                 │
//! │       │  SQL on the session connection                                 │
//! │       ▼                                                                 │
//! │  SQLite (pending until Store::save commits)                            │
//! │                                                                         │
//! │  Repositories borrow the connection, so two of them can never write   │
//! │  at the same time.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ItemRepository`] - Item CRUD, lazy queries, pick-lists, totals
//! - [`FieldRepository`] - Field definitions
//! - [`SettingsRepository`] - Version marker and password hash
//! - [`AttachmentRepository`] - Embedded blobs

pub mod attachments;
pub mod fields;
pub mod items;
pub mod settings;

pub use attachments::AttachmentRepository;
pub use fields::FieldRepository;
pub use items::{ItemRepository, ItemStream};
pub use settings::SettingsRepository;
