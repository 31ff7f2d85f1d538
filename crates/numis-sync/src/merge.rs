//! # Collection Merge
//!
//! Brings the items of an incoming collection into the local one.
//!
//! ## Merge Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Per Incoming Item                                    │
//! │                                                                         │
//! │  local.get(incoming.id)                                                │
//! │       │                                                                 │
//! │       ├── absent           → insert (id and timestamps kept)           │
//! │       ├── same content     → unchanged                                 │
//! │       └── different        → replace local with incoming               │
//! │                                                                         │
//! │  Items that exist only locally are never touched.                      │
//! │  Each item runs in its own savepoint.                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The merged items are pending work of the local store; the caller decides
//! when to `save`.

use futures_util::TryStreamExt;
use numis_core::{Item, MergeOutcome, MergeReport, NewItem, Predicate};
use numis_db::{DbError, Store};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::SyncSettings;
use crate::error::{SyncError, SyncResult};

/// Merges incoming collections into a local one.
#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    settings: SyncSettings,
}

impl Synchronizer {
    pub fn new(settings: SyncSettings) -> Self {
        Synchronizer { settings }
    }

    /// Merges every item of `incoming` into `local`.
    ///
    /// Cancellation is checked between items. Items merged before the
    /// cancellation stay in `local` as unsaved changes.
    pub async fn synchronize(
        &self,
        local: &mut Store,
        incoming: &mut Store,
        cancel: &CancellationToken,
    ) -> SyncResult<MergeReport> {
        self.synchronize_with_progress(local, incoming, cancel, |_| {}).await
    }

    /// Like [`synchronize`](Self::synchronize), calling `progress` with the
    /// running report after each merged item.
    pub async fn synchronize_with_progress<F>(
        &self,
        local: &mut Store,
        incoming: &mut Store,
        cancel: &CancellationToken,
        mut progress: F,
    ) -> SyncResult<MergeReport>
    where
        F: FnMut(&MergeReport),
    {
        if local.is_read_only() {
            return Err(DbError::ReadOnly.into());
        }
        info!(
            local = %local.path().display(),
            incoming = %incoming.path().display(),
            "Synchronizing collections"
        );

        let mut report = MergeReport::default();
        let progress_every = self.settings.progress_every.max(1);

        let mut items = incoming.query(&Predicate::match_all(), None).await?;
        while let Some(item) = items.try_next().await? {
            if cancel.is_cancelled() {
                info!(%report, "Synchronization cancelled");
                return Err(SyncError::Cancelled);
            }

            let outcome = merge_item(local, item).await?;
            report.record(outcome);
            progress(&report);

            if report.total() % progress_every == 0 {
                info!(processed = report.total(), "Synchronizing collections");
            }
        }

        if report.is_identical() {
            info!(unchanged = report.unchanged, "Collections look identical");
        } else {
            info!(%report, "Synchronization finished");
        }
        Ok(report)
    }
}

async fn merge_item(local: &mut Store, incoming: Item) -> SyncResult<MergeOutcome> {
    let mut tx = local.transaction().await?;

    let outcome = match tx.get(&incoming.id).await? {
        None => {
            debug!(id = %incoming.id, "Inserting incoming item");
            tx.insert(&NewItem::from(incoming)).await?;
            MergeOutcome::Inserted
        }
        Some(existing) if existing.same_content(&incoming) => MergeOutcome::Unchanged,
        Some(_) => {
            debug!(id = %incoming.id, "Updating item from incoming");
            tx.replace(&incoming).await?;
            MergeOutcome::Updated
        }
    };

    tx.commit().await?;
    Ok(outcome)
}

/// Merges `incoming` into `local` with default settings.
pub async fn synchronize(
    local: &mut Store,
    incoming: &mut Store,
    cancel: &CancellationToken,
) -> SyncResult<MergeReport> {
    Synchronizer::default().synchronize(local, incoming, cancel).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use numis_core::{FieldValue, ItemChanges, ItemId, ItemStatus};

    fn coin(id: &ItemId, country: &str, year: i64) -> NewItem {
        let mut coin = NewItem::new(ItemStatus::Owned)
            .with("country", FieldValue::text(country))
            .with("year", FieldValue::Integer(year));
        coin.id = Some(id.clone());
        coin
    }

    /// Two stores sharing items `a` and `b`; local also has `c`.
    async fn pair(dir: &std::path::Path) -> (Store, Store, [ItemId; 3]) {
        let ids = [ItemId::generate(), ItemId::generate(), ItemId::generate()];

        let mut local = Store::create(dir.join("local.db")).await.unwrap();
        let mut incoming = Store::create(dir.join("incoming.db")).await.unwrap();
        for store in [&mut local, &mut incoming] {
            store.insert(coin(&ids[0], "X", 1990)).await.unwrap();
            store.insert(coin(&ids[1], "Y", 2000)).await.unwrap();
        }
        local.insert(coin(&ids[2], "Z", 2010)).await.unwrap();

        (local, incoming, ids)
    }

    #[tokio::test]
    async fn test_identical_collections() {
        let dir = tempfile::tempdir().unwrap();
        let (mut local, mut incoming, _) = pair(dir.path()).await;

        let report = synchronize(&mut local, &mut incoming, &CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_identical());
        assert_eq!(report.unchanged, 2);
    }

    #[tokio::test]
    async fn test_insert_update_and_keep_local_only() {
        let dir = tempfile::tempdir().unwrap();
        let (mut local, mut incoming, ids) = pair(dir.path()).await;

        incoming
            .update(&ids[1], &ItemChanges::new().set("year", FieldValue::Integer(2001)))
            .await
            .unwrap();
        let new_id = incoming.insert(coin(&ItemId::generate(), "W", 1980)).await.unwrap();

        let report = synchronize(&mut local, &mut incoming, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.unchanged, 1);

        assert_eq!(local.count().await.unwrap(), 4);
        let updated = local.get(&ids[1]).await.unwrap().unwrap();
        let source = incoming.get(&ids[1]).await.unwrap().unwrap();
        assert_eq!(updated.field("year"), Some(&FieldValue::Integer(2001)));
        assert_eq!(updated.updated_at, source.updated_at);
        assert!(local.get(&ids[2]).await.unwrap().is_some());
        assert!(local.get(&new_id).await.unwrap().is_some());
        assert!(local.is_dirty());
    }

    #[tokio::test]
    async fn test_second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut local, mut incoming, _) = pair(dir.path()).await;
        incoming.insert(coin(&ItemId::generate(), "W", 1980)).await.unwrap();

        let cancel = CancellationToken::new();
        synchronize(&mut local, &mut incoming, &cancel).await.unwrap();
        let again = synchronize(&mut local, &mut incoming, &cancel).await.unwrap();
        assert!(again.is_identical());
        assert_eq!(again.unchanged, 3);
    }

    #[tokio::test]
    async fn test_cancelled_merge() {
        let dir = tempfile::tempdir().unwrap();
        let (mut local, mut incoming, _) = pair(dir.path()).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = synchronize(&mut local, &mut incoming, &cancel).await;
        assert!(matches!(result, Err(SyncError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancel_between_items_keeps_merged_ones() {
        let dir = tempfile::tempdir().unwrap();
        let (mut local, mut incoming, _) = pair(dir.path()).await;
        let first = incoming.insert(coin(&ItemId::generate(), "V", 1970)).await.unwrap();
        let second = incoming.insert(coin(&ItemId::generate(), "W", 1980)).await.unwrap();
        local.save().await.unwrap();

        // Shared items come first, so the first insert is the third item.
        let cancel = CancellationToken::new();
        let result = Synchronizer::default()
            .synchronize_with_progress(&mut local, &mut incoming, &cancel, |report| {
                if report.inserted == 1 {
                    cancel.cancel();
                }
            })
            .await;
        assert!(matches!(result, Err(SyncError::Cancelled)));

        assert!(local.is_dirty());
        assert_eq!(local.count().await.unwrap(), 4);
        let merged = local.get(&first).await.unwrap().unwrap();
        let source = incoming.get(&first).await.unwrap().unwrap();
        assert!(merged.same_content(&source));
        assert_eq!(merged.created_at, source.created_at);
        assert!(local.get(&second).await.unwrap().is_none());

        let report = synchronize(&mut local, &mut incoming, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((report.inserted, report.updated, report.unchanged), (1, 0, 3));
    }

    #[tokio::test]
    async fn test_merge_with_copy_of_itself() {
        let dir = tempfile::tempdir().unwrap();
        let (mut local, incoming, _) = pair(dir.path()).await;
        incoming.close().await.unwrap();
        local.save().await.unwrap();

        let copy = dir.path().join("copy.db");
        tokio::fs::copy(local.path(), &copy).await.unwrap();
        let mut same = Store::open(&copy, None).await.unwrap();

        let report = synchronize(&mut local, &mut same, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!((report.inserted, report.updated, report.unchanged), (0, 0, 3));
        assert!(!local.is_dirty());
    }

    #[tokio::test]
    async fn test_read_only_local() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("local.db");
        Store::create(&path).await.unwrap().close().await.unwrap();
        let mut local = Store::open_with(&path, None, numis_db::DbConfig::new().read_only(true))
            .await
            .unwrap();
        let mut incoming = Store::create(dir.path().join("incoming.db")).await.unwrap();

        let result = synchronize(&mut local, &mut incoming, &CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::Store(DbError::ReadOnly))));
    }
}
