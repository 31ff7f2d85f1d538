//! # numis-sync: Collection Merge for Numis
//!
//! Merges one collection into another and loads user configuration.
//!
//! ## Modules
//!
//! - [`merge`] - The synchronizer
//! - [`config`] - TOML + environment configuration
//! - [`error`] - Sync error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use numis_db::Store;
//! use numis_sync::{NumisConfig, Synchronizer};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = NumisConfig::load_or_default(None);
//! let mut local = Store::open_with("coins.db", None, config.db_config()).await?;
//! let mut incoming = Store::open("friend.db", None).await?;
//!
//! let report = Synchronizer::new(config.sync.clone())
//!     .synchronize(&mut local, &mut incoming, &CancellationToken::new())
//!     .await?;
//! println!("{report}");
//! local.save().await?;
//! ```

pub mod config;
pub mod error;
pub mod merge;

pub use config::{BackupSettings, FilterSettings, NumisConfig, StoreSettings, SyncSettings};
pub use error::{SyncError, SyncResult};
pub use merge::{synchronize, Synchronizer};
