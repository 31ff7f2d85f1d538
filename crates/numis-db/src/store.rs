//! # Collection Store
//!
//! Opening, creating, editing and saving one collection file.
//!
//! ## Session Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Store Session                                      │
//! │                                                                         │
//! │  Store::open(path, password)                                           │
//! │       │  lock  →  probe version  →  check password  →  migrate?        │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │  SqlitePool (1 connection)              │                           │
//! │  │   └── session transaction (BEGIN)       │ ◄── insert/update/delete  │
//! │  │         └── savepoints                  │ ◄── StoreTransaction      │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       │  save()  → COMMIT, BEGIN         (dirty = false)               │
//! │       │  close() → ROLLBACK              (pending work discarded)      │
//! │       ▼                                                                 │
//! │  collection.db  (rollback journal, self-contained file)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every method that touches the session takes `&mut self`: a store has one
//! owner at a time, and a lazy query borrows it until it is dropped.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use numis_core::validation::{
    validate_changes, validate_field_value, validate_new_item, validate_new_password,
};
use numis_core::{
    CollectionSummary, CoreError, DistinctValues, FieldCatalog, Item, ItemChanges, ItemId, NewItem,
    Predicate, SortOrder,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Connection, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backup;
use crate::error::{DbError, DbResult};
use crate::lock::StoreLock;
use crate::migrations::{self, Migrator};
use crate::password;
use crate::reference::ReferenceAttachments;
use crate::repository::{
    AttachmentRepository, FieldRepository, ItemRepository, ItemStream, SettingsRepository,
};
use crate::schema::{create_schema, now, CURRENT_VERSION};

// =============================================================================
// Configuration
// =============================================================================

/// Automatic backup settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupPolicy {
    /// Directory receiving backups. `None` disables autobackup.
    pub dir: Option<PathBuf>,

    /// Saved changes before an autobackup is taken. 0 disables autobackup.
    pub changes_before_backup: u64,
}

/// Store configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new()
///     .read_only(true)
///     .busy_timeout(Duration::from_secs(2));
/// let store = Store::open_with("coins.db", None, config).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    /// Open without write access. Mutations fail with `ReadOnly`.
    /// Default: false
    pub read_only: bool,

    /// How long SQLite waits on a busy file.
    /// Default: 5 seconds
    pub busy_timeout: Duration,

    /// Autobackup after save.
    /// Default: disabled
    pub backup: BackupPolicy,
}

impl DbConfig {
    pub fn new() -> Self {
        DbConfig {
            read_only: false,
            busy_timeout: Duration::from_secs(5),
            backup: BackupPolicy::default(),
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Enables autobackup into `dir` every `changes` saved changes.
    pub fn autobackup(mut self, dir: impl Into<PathBuf>, changes: u64) -> Self {
        self.backup = BackupPolicy {
            dir: Some(dir.into()),
            changes_before_backup: changes,
        };
        self
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        DbConfig::new()
    }
}

/// SQLite options for a collection file.
///
/// Rollback journal (DELETE) keeps every committed byte in the main file,
/// which migration and backup copy around.
pub(crate) fn connect_options(path: &Path, read_only: bool, busy_timeout: Duration) -> SqliteConnectOptions {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(false)
        .busy_timeout(busy_timeout);

    if read_only {
        options.read_only(true)
    } else {
        options
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Full)
    }
}

fn session_conn<'a>(session: &'a mut Option<Transaction<'static, Sqlite>>) -> DbResult<&'a mut SqliteConnection> {
    session.as_deref_mut().ok_or(DbError::Closed)
}

// =============================================================================
// Store
// =============================================================================

/// An open collection.
pub struct Store {
    path: PathBuf,
    config: DbConfig,
    pool: SqlitePool,
    session: Option<Transaction<'static, Sqlite>>,
    catalog: FieldCatalog,
    dirty: bool,
    pending_changes: u64,
    changes_since_backup: u64,
    _lock: StoreLock,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("read_only", &self.config.read_only)
            .field("dirty", &self.dirty)
            .field("open", &self.session.is_some())
            .finish()
    }
}

impl Store {
    /// Opens an existing collection with default settings.
    pub async fn open(path: impl AsRef<Path>, password: Option<&str>) -> DbResult<Self> {
        Self::open_with(path, password, DbConfig::default()).await
    }

    /// Opens an existing collection.
    ///
    /// ## What This Does
    /// 1. Takes the store lock (`Locked` if another session has it)
    /// 2. Reads the version marker (`WrongFormat`, `NewerVersion`)
    /// 3. Checks the password (`IncorrectPassword`)
    /// 4. Migrates an older file to the current version
    /// 5. Begins the session and loads the field catalog
    pub async fn open_with(path: impl AsRef<Path>, password: Option<&str>, config: DbConfig) -> DbResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), read_only = config.read_only, "Opening collection");

        if !tokio::fs::try_exists(path).await? {
            return Err(DbError::not_found("Collection", path.display().to_string()));
        }
        let lock = StoreLock::acquire(path)?;

        let probe = migrations::probe(path, config.busy_timeout).await?;
        if probe.version > CURRENT_VERSION {
            return Err(DbError::NewerVersion {
                found: probe.version,
                supported: CURRENT_VERSION,
            });
        }
        password::check(probe.password_hash.as_deref(), password)?;

        if probe.version < CURRENT_VERSION {
            if config.read_only {
                return Err(DbError::ReadOnly);
            }
            Migrator::standard()
                .busy_timeout(config.busy_timeout)
                .migrate(path, probe.version, &CancellationToken::new())
                .await?;
        }

        Self::connect(path, config, lock).await
    }

    /// Creates a new, empty collection with default settings.
    pub async fn create(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::create_with(path, DbConfig::default()).await
    }

    /// Creates a new, empty collection at the current version.
    pub async fn create_with(path: impl AsRef<Path>, config: DbConfig) -> DbResult<Self> {
        let path = path.as_ref();
        if config.read_only {
            return Err(DbError::ReadOnly);
        }
        if tokio::fs::try_exists(path).await? {
            return Err(DbError::AlreadyExists(path.to_path_buf()));
        }
        let lock = StoreLock::acquire(path)?;

        info!(path = %path.display(), version = CURRENT_VERSION, "Creating collection");

        let options = connect_options(path, false, config.busy_timeout).create_if_missing(true);
        let result = async {
            let mut conn = SqliteConnection::connect_with(&options).await?;
            let mut tx = conn.begin().await?;
            create_schema(&mut tx, &FieldCatalog::builtin()).await?;
            tx.commit().await?;
            conn.close().await?;
            Ok::<_, DbError>(())
        }
        .await;

        if let Err(e) = result {
            if let Err(rm) = tokio::fs::remove_file(path).await {
                warn!(path = %path.display(), error = %rm, "Failed to remove half-created collection");
            }
            return Err(e);
        }

        Self::connect(path, config, lock).await
    }

    async fn connect(path: &Path, config: DbConfig, lock: StoreLock) -> DbResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .acquire_timeout(config.busy_timeout)
            .connect_with(connect_options(path, config.read_only, config.busy_timeout))
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        let mut session = pool.begin().await?;
        let catalog = FieldRepository::new(&mut session).load().await?;

        debug!(fields = catalog.len(), "Collection session started");

        Ok(Store {
            path: path.to_path_buf(),
            config,
            pool,
            session: Some(session),
            catalog,
            dirty: false,
            pending_changes: 0,
            changes_since_backup: 0,
            _lock: lock,
        })
    }

    // -------------------------------------------------------------------------
    // State
    // -------------------------------------------------------------------------

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    /// Field definitions in display order.
    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// True if there are mutations not yet saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Schema version of the open file.
    pub fn version(&self) -> u32 {
        CURRENT_VERSION
    }

    pub(crate) fn ensure_writable(&self) -> DbResult<()> {
        if self.config.read_only {
            return Err(DbError::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn connection(&mut self) -> DbResult<&mut SqliteConnection> {
        session_conn(&mut self.session)
    }

    fn record_change(&mut self) {
        self.dirty = true;
        self.pending_changes += 1;
    }

    fn items(&mut self) -> DbResult<ItemRepository<'_>> {
        Ok(ItemRepository::new(session_conn(&mut self.session)?, &self.catalog))
    }

    // -------------------------------------------------------------------------
    // Items
    // -------------------------------------------------------------------------

    /// Inserts an item and returns its id.
    pub async fn insert(&mut self, item: NewItem) -> DbResult<ItemId> {
        self.ensure_writable()?;
        validate_new_item(&self.catalog, &item)?;
        let id = self.items()?.insert(&item, now()).await?;
        self.record_change();
        Ok(id)
    }

    pub async fn get(&mut self, id: &ItemId) -> DbResult<Option<Item>> {
        self.items()?.get(id).await
    }

    /// Applies a change set to one item.
    pub async fn update(&mut self, id: &ItemId, changes: &ItemChanges) -> DbResult<()> {
        self.ensure_writable()?;
        validate_changes(&self.catalog, changes)?;
        self.items()?.update(id, changes, now()).await?;
        self.record_change();
        Ok(())
    }

    /// Overwrites an item's status and fields with `item`, keeping its creation time.
    pub async fn replace(&mut self, item: &Item) -> DbResult<()> {
        self.ensure_writable()?;
        for (name, value) in &item.fields {
            validate_field_value(&self.catalog, name, value)?;
        }
        self.items()?.replace(item).await?;
        self.record_change();
        Ok(())
    }

    /// Inserts a copy of an item under a new id and returns that id.
    pub async fn duplicate(&mut self, id: &ItemId) -> DbResult<ItemId> {
        self.ensure_writable()?;
        let source = self
            .items()?
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("Item", id.as_str()))?;

        let copy = NewItem {
            status: source.status,
            fields: source.fields,
            ..NewItem::default()
        };
        let copy_id = self.items()?.insert(&copy, now()).await?;
        self.record_change();
        debug!(source = %id, copy = %copy_id, "Item duplicated");
        Ok(copy_id)
    }

    /// Applies one change set to several items, all or none.
    ///
    /// Fails with `NotFound` on the first unknown id, leaving every item as
    /// it was.
    pub async fn update_many(&mut self, ids: &[ItemId], changes: &ItemChanges) -> DbResult<u64> {
        let mut tx = self.transaction().await?;
        for id in ids {
            tx.update(id, changes).await?;
        }
        tx.commit().await?;

        debug!(items = ids.len(), "Batch update applied");
        Ok(ids.len() as u64)
    }

    pub async fn delete(&mut self, id: &ItemId) -> DbResult<()> {
        self.ensure_writable()?;
        self.items()?.delete(id).await?;
        self.record_change();
        Ok(())
    }

    pub async fn count(&mut self) -> DbResult<u64> {
        self.items()?.count().await
    }

    /// Lazily streams the items matching `predicate`.
    ///
    /// Each call runs against the current state, pending mutations included.
    ///
    /// ## Example
    /// ```rust,ignore
    /// use futures_util::TryStreamExt;
    ///
    /// let mut items = store.query(&Predicate::match_all(), None).await?;
    /// while let Some(item) = items.try_next().await? {
    ///     println!("{}", item.id);
    /// }
    /// ```
    pub async fn query(&mut self, predicate: &Predicate, order: Option<&SortOrder>) -> DbResult<ItemStream<'_>> {
        self.items()?.query(predicate, order)
    }

    /// Values for a column pick-list.
    pub async fn distinct_values(&mut self, field: &str) -> DbResult<DistinctValues> {
        self.items()?.distinct_values(field).await
    }

    pub async fn summary(&mut self) -> DbResult<CollectionSummary> {
        self.items()?.summary().await
    }

    /// Starts a scoped transaction (a savepoint inside the session).
    ///
    /// Dropping it without [`StoreTransaction::commit`] undoes its writes.
    pub async fn transaction(&mut self) -> DbResult<StoreTransaction<'_>> {
        self.ensure_writable()?;
        let tx = session_conn(&mut self.session)?.begin().await?;
        Ok(StoreTransaction {
            tx,
            catalog: &self.catalog,
            dirty: &mut self.dirty,
            pending_changes: &mut self.pending_changes,
            writes: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Settings
    // -------------------------------------------------------------------------

    /// Sets or removes the collection password. Takes effect on save.
    ///
    /// Use `None` to remove it; an empty or too short password is rejected.
    pub async fn set_password(&mut self, password: Option<&str>) -> DbResult<()> {
        self.ensure_writable()?;
        if let Some(password) = password {
            validate_new_password(password, password).map_err(CoreError::from)?;
        }
        let hash = password.map(password::hash_password).transpose()?;
        SettingsRepository::new(self.connection()?)
            .set_password_hash(hash.as_deref())
            .await?;
        self.record_change();
        info!(protected = hash.is_some(), "Collection password changed");
        Ok(())
    }

    /// Field definitions in display order.
    pub fn fields(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub async fn set_field_enabled(&mut self, name: &str, enabled: bool) -> DbResult<()> {
        self.ensure_writable()?;
        let mut catalog = self.catalog.clone();
        catalog.set_enabled(name, enabled)?;
        self.store_field(catalog, name).await
    }

    pub async fn set_field_title(&mut self, name: &str, title: &str) -> DbResult<()> {
        self.ensure_writable()?;
        let mut catalog = self.catalog.clone();
        catalog.set_title(name, title)?;
        self.store_field(catalog, name).await
    }

    async fn store_field(&mut self, catalog: FieldCatalog, name: &str) -> DbResult<()> {
        let field = catalog.require(name)?;
        FieldRepository::new(self.connection()?).update(field).await?;
        self.catalog = catalog;
        self.record_change();
        Ok(())
    }

    /// Reference attachment manager for this store.
    pub fn reference(&mut self) -> ReferenceAttachments<'_> {
        ReferenceAttachments::new(self)
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Commits pending mutations to the file.
    ///
    /// A failed commit rolls the session back: the pending mutations are
    /// lost, the store is clean again and the error says how many were
    /// dropped.
    pub async fn save(&mut self) -> DbResult<()> {
        self.ensure_writable()?;
        let session = self.session.take().ok_or(DbError::Closed)?;
        let pending = self.pending_changes;
        let committed = session.commit().await;

        self.dirty = false;
        self.pending_changes = 0;

        if let Err(e) = committed {
            warn!(lost = pending, error = %e, "Save failed, unsaved changes rolled back");
            match self.pool.begin().await {
                Ok(session) => self.session = Some(session),
                Err(begin) => warn!(error = %begin, "Failed to restart collection session"),
            }
            return Err(DbError::Io(format!(
                "save failed, {} unsaved changes rolled back: {}",
                pending, e
            )));
        }

        self.changes_since_backup += pending;
        info!(changes = pending, "Collection saved");

        self.session = Some(self.pool.begin().await?);
        self.autobackup().await;
        Ok(())
    }

    async fn autobackup(&mut self) {
        let policy = &self.config.backup;
        let Some(dir) = policy.dir.clone() else {
            return;
        };
        if policy.changes_before_backup == 0 || self.changes_since_backup < policy.changes_before_backup {
            return;
        }

        match self.backup(&dir).await {
            Ok(path) => {
                debug!(backup = %path.display(), "Autobackup written");
                self.changes_since_backup = 0;
            }
            Err(e) => warn!(error = %e, "Autobackup failed"),
        }
    }

    /// Writes a snapshot of the last saved state into `dir`.
    ///
    /// Returns the backup file path, `<stem>_<YYYYMMDD_HHMMSS>.db`.
    pub async fn backup(&self, dir: impl AsRef<Path>) -> DbResult<PathBuf> {
        backup::snapshot(&self.path, dir.as_ref(), self.config.busy_timeout).await
    }

    /// Discards pending mutations and releases the file.
    pub async fn close(mut self) -> DbResult<()> {
        if let Some(session) = self.session.take() {
            if self.dirty {
                debug!(changes = self.pending_changes, "Discarding unsaved changes");
            }
            session.rollback().await?;
        }
        self.pool.close().await;
        info!(path = %self.path.display(), "Collection closed");
        Ok(())
    }
}

// =============================================================================
// Store Transaction
// =============================================================================

/// A group of mutations applied atomically inside the session.
///
/// ## Usage
/// ```rust,ignore
/// let mut tx = store.transaction().await?;
/// tx.insert(&coin).await?;
/// tx.commit().await?;      // or drop to roll back
/// ```
pub struct StoreTransaction<'s> {
    tx: Transaction<'s, Sqlite>,
    catalog: &'s FieldCatalog,
    dirty: &'s mut bool,
    pending_changes: &'s mut u64,
    writes: u64,
}

impl<'s> StoreTransaction<'s> {
    fn items(&mut self) -> ItemRepository<'_> {
        ItemRepository::new(&mut self.tx, self.catalog)
    }

    pub async fn get(&mut self, id: &ItemId) -> DbResult<Option<Item>> {
        self.items().get(id).await
    }

    pub async fn insert(&mut self, item: &NewItem) -> DbResult<ItemId> {
        validate_new_item(self.catalog, item)?;
        let id = self.items().insert(item, now()).await?;
        self.writes += 1;
        Ok(id)
    }

    pub async fn update(&mut self, id: &ItemId, changes: &ItemChanges) -> DbResult<()> {
        validate_changes(self.catalog, changes)?;
        self.items().update(id, changes, now()).await?;
        self.writes += 1;
        Ok(())
    }

    pub async fn replace(&mut self, item: &Item) -> DbResult<()> {
        for (name, value) in &item.fields {
            validate_field_value(self.catalog, name, value)?;
        }
        self.items().replace(item).await?;
        self.writes += 1;
        Ok(())
    }

    pub async fn attachment(&mut self, name: &str) -> DbResult<Option<Vec<u8>>> {
        AttachmentRepository::new(&mut self.tx).get(name).await
    }

    pub async fn has_attachment(&mut self, name: &str) -> DbResult<bool> {
        AttachmentRepository::new(&mut self.tx).exists(name).await
    }

    pub async fn put_attachment(&mut self, name: &str, data: &[u8]) -> DbResult<()> {
        AttachmentRepository::new(&mut self.tx).insert(name, data).await?;
        self.writes += 1;
        Ok(())
    }

    /// Removes an attachment. Returns whether one existed.
    pub async fn remove_attachment(&mut self, name: &str) -> DbResult<bool> {
        let removed = AttachmentRepository::new(&mut self.tx).remove(name).await?;
        if removed {
            self.writes += 1;
        }
        Ok(removed)
    }

    /// Releases the savepoint, keeping its writes as pending session work.
    pub async fn commit(self) -> DbResult<()> {
        self.tx.commit().await?;
        if self.writes > 0 {
            *self.dirty = true;
            *self.pending_changes += self.writes;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::fixtures::{create_v1, LegacyCoin};
    use futures_util::TryStreamExt;
    use numis_core::{FieldValue, ItemStatus};

    fn coin(country: &str, year: i64) -> NewItem {
        NewItem::new(ItemStatus::Owned)
            .with("country", FieldValue::text(country))
            .with("year", FieldValue::Integer(year))
    }

    async fn all(store: &mut Store) -> Vec<Item> {
        store
            .query(&Predicate::match_all(), None)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap()
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new()
            .read_only(true)
            .busy_timeout(Duration::from_secs(1))
            .autobackup("/tmp/backups", 10);

        assert!(config.read_only);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
        assert_eq!(config.backup.changes_before_backup, 10);
    }

    #[tokio::test]
    async fn test_inserted_item_listed_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::create(dir.path().join("coins.db")).await.unwrap();

        let id = store.insert(coin("X", 1990)).await.unwrap();
        store.insert(coin("Y", 1990)).await.unwrap();

        let items = all(&mut store).await;
        assert_eq!(items.iter().filter(|i| i.id == id).count(), 1);
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_update_then_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::create(dir.path().join("coins.db")).await.unwrap();
        let id = store.insert(coin("X", 1990)).await.unwrap();

        store
            .update(&id, &ItemChanges::new().set("year", FieldValue::Integer(1991)))
            .await
            .unwrap();

        let items = all(&mut store).await;
        assert_eq!(items[0].field("year"), Some(&FieldValue::Integer(1991)));
        assert_eq!(items[0].field("country"), Some(&FieldValue::text("X")));
    }

    #[tokio::test]
    async fn test_dirty_flag_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();
        assert!(!store.is_dirty());

        store.insert(coin("X", 1990)).await.unwrap();
        assert!(store.is_dirty());
        store.save().await.unwrap();
        assert!(!store.is_dirty());
        store.close().await.unwrap();

        let mut store = Store::open(&path, None).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_close_discards_unsaved_work() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();
        store.insert(coin("X", 1990)).await.unwrap();
        store.save().await.unwrap();
        store.insert(coin("Y", 1990)).await.unwrap();
        store.close().await.unwrap();

        let mut store = Store::open(&path, None).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_open_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.db");
        assert!(matches!(
            Store::open(&missing, None).await,
            Err(DbError::NotFound { .. })
        ));

        let junk = dir.path().join("junk.db");
        tokio::fs::write(&junk, b"this is a shopping list, not a coin collection")
            .await
            .unwrap();
        assert!(matches!(
            Store::open(&junk, None).await,
            Err(DbError::WrongFormat(_))
        ));
        // A failed open releases the lock.
        assert!(!StoreLock::path_for(&junk).exists());
    }

    #[tokio::test]
    async fn test_create_over_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        Store::create(&path).await.unwrap().close().await.unwrap();
        assert!(matches!(
            Store::create(&path).await,
            Err(DbError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_second_session_is_locked_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let store = Store::create(&path).await.unwrap();

        assert!(matches!(Store::open(&path, None).await, Err(DbError::Locked(_))));
        store.close().await.unwrap();
        assert!(Store::open(&path, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_left_by_crash_can_be_broken() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        Store::create(&path).await.unwrap().close().await.unwrap();
        std::fs::write(StoreLock::path_for(&path), "").unwrap();

        assert!(matches!(Store::open(&path, None).await, Err(DbError::Locked(_))));
        assert!(StoreLock::break_lock(&path).unwrap());
        let store = Store::open(&path, None).await.unwrap();
        store.close().await.unwrap();
        assert!(!StoreLock::path_for(&path).exists());
    }

    #[tokio::test]
    async fn test_newer_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();
        SettingsRepository::new(store.connection().unwrap())
            .set_version(CURRENT_VERSION + 1)
            .await
            .unwrap();
        store.dirty = true;
        store.save().await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(
            Store::open(&path, None).await,
            Err(DbError::NewerVersion { found, .. }) if found == CURRENT_VERSION + 1
        ));
    }

    #[tokio::test]
    async fn test_password_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();
        store.set_password(Some("obverse")).await.unwrap();
        store.save().await.unwrap();
        store.close().await.unwrap();

        assert!(matches!(Store::open(&path, None).await, Err(DbError::IncorrectPassword)));
        assert!(matches!(
            Store::open(&path, Some("reverse")).await,
            Err(DbError::IncorrectPassword)
        ));

        let mut store = Store::open(&path, Some("obverse")).await.unwrap();
        store.set_password(None).await.unwrap();
        store.save().await.unwrap();
        store.close().await.unwrap();
        assert!(Store::open(&path, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_password_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();

        assert!(matches!(
            store.set_password(Some("")).await,
            Err(DbError::Core(CoreError::Validation(_)))
        ));
        assert!(store.set_password(Some("abc")).await.is_err());
        assert!(!store.is_dirty());
        store.save().await.unwrap();
        store.close().await.unwrap();

        assert!(Store::open(&path, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_item() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::create(dir.path().join("coins.db")).await.unwrap();
        let id = store.insert(coin("X", 1990)).await.unwrap();

        let copy_id = store.duplicate(&id).await.unwrap();
        assert_ne!(copy_id, id);

        let original = store.get(&id).await.unwrap().unwrap();
        let copy = store.get(&copy_id).await.unwrap().unwrap();
        assert!(copy.same_content(&original));
        assert!(copy.created_at >= original.created_at);
        assert_eq!(store.count().await.unwrap(), 2);

        assert!(matches!(
            store.duplicate(&ItemId::generate()).await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_update_many_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::create(dir.path().join("coins.db")).await.unwrap();
        let a = store.insert(coin("X", 1990)).await.unwrap();
        let b = store.insert(coin("Y", 1991)).await.unwrap();
        store.save().await.unwrap();

        let changes = ItemChanges::new().set("metal", FieldValue::text("Silver"));
        let result = store
            .update_many(&[a.clone(), ItemId::generate(), b.clone()], &changes)
            .await;
        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert!(store.get(&a).await.unwrap().unwrap().field("metal").is_none());
        assert!(!store.is_dirty());

        let updated = store.update_many(&[a.clone(), b.clone()], &changes).await.unwrap();
        assert_eq!(updated, 2);
        for id in [&a, &b] {
            let item = store.get(id).await.unwrap().unwrap();
            assert_eq!(item.field("metal"), Some(&FieldValue::text("Silver")));
        }
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_failed_save_reports_lost_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let config = DbConfig::new().busy_timeout(Duration::from_millis(100));
        let mut store = Store::create_with(&path, config).await.unwrap();
        store.insert(coin("X", 1990)).await.unwrap();
        store.save().await.unwrap();

        // A reader holding a shared lock keeps the commit from finishing.
        let mut reader = SqliteConnection::connect_with(&connect_options(&path, true, Duration::from_millis(100)))
            .await
            .unwrap();
        let mut read_tx = reader.begin().await.unwrap();
        let seen: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coins")
            .fetch_one(&mut *read_tx)
            .await
            .unwrap();
        assert_eq!(seen, 1);

        store.insert(coin("Y", 1991)).await.unwrap();
        let result = store.save().await;
        assert!(matches!(&result, Err(DbError::Io(msg)) if msg.contains("1 unsaved changes")));
        assert!(!store.is_dirty());

        read_tx.rollback().await.unwrap();
        reader.close().await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        store.insert(coin("Z", 1992)).await.unwrap();
        store.save().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_read_only_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();
        store.insert(coin("X", 1990)).await.unwrap();
        store.save().await.unwrap();
        store.close().await.unwrap();

        let mut store = Store::open_with(&path, None, DbConfig::new().read_only(true))
            .await
            .unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(matches!(store.insert(coin("Y", 1)).await, Err(DbError::ReadOnly)));
        assert!(matches!(store.save().await, Err(DbError::ReadOnly)));
    }

    #[tokio::test]
    async fn test_open_migrates_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        create_v1(
            &path,
            &[
                LegacyCoin { country: "X", year: 1990, value: Some(2.5), status: "owned" },
                LegacyCoin { country: "Y", year: 1990, value: None, status: "wish" },
            ],
        )
        .await;

        let read_only = Store::open_with(&path, None, DbConfig::new().read_only(true)).await;
        assert!(matches!(read_only, Err(DbError::ReadOnly)));

        let mut store = Store::open(&path, None).await.unwrap();
        let items = all(&mut store).await;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].field("value"),
            Some(&FieldValue::Money(numis_core::Money::from_cents(250)))
        );
        assert_eq!(items[1].status, ItemStatus::Wish);
        assert_eq!(store.catalog(), &FieldCatalog::builtin());
        store.close().await.unwrap();

        assert_eq!(migrations::read_version(&path).await.unwrap(), CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_field_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coins.db");
        let mut store = Store::create(&path).await.unwrap();

        store.set_field_title("saller", "Seller").await.unwrap();
        store.set_field_enabled("mintmark", false).await.unwrap();
        assert!(store.set_field_enabled("status", false).await.is_err());
        store.save().await.unwrap();
        store.close().await.unwrap();

        let store = Store::open(&path, None).await.unwrap();
        assert_eq!(store.fields().get("saller").unwrap().title, "Seller");
        assert!(!store.fields().get("mintmark").unwrap().enabled);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::create(dir.path().join("coins.db")).await.unwrap();

        {
            let mut tx = store.transaction().await.unwrap();
            tx.insert(&coin("X", 1990)).await.unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(!store.is_dirty());

        let mut tx = store.transaction().await.unwrap();
        tx.insert(&coin("X", 1990)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.is_dirty());
    }

    #[tokio::test]
    async fn test_backup_and_autobackup() {
        let dir = tempfile::tempdir().unwrap();
        let backups = dir.path().join("backups");
        let path = dir.path().join("coins.db");
        let config = DbConfig::new().autobackup(&backups, 2);
        let mut store = Store::create_with(&path, config).await.unwrap();

        store.insert(coin("X", 1990)).await.unwrap();
        store.save().await.unwrap();
        assert!(!backups.exists());

        store.insert(coin("Y", 1990)).await.unwrap();
        store.save().await.unwrap();
        let mut entries = tokio::fs::read_dir(&backups).await.unwrap();
        let backup = entries.next_entry().await.unwrap().unwrap().path();
        store.close().await.unwrap();

        let mut copy = Store::open(&backup, None).await.unwrap();
        assert_eq!(copy.count().await.unwrap(), 2);
    }
}
