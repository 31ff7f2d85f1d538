//! Collection backups.
//!
//! A backup is a self-contained copy of the last saved state, written with
//! `VACUUM INTO` from a separate read-only connection so the session's
//! pending work never leaks into it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};
use sqlx::{Connection, SqliteConnection};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::store::connect_options;

/// Backup file name for `store` taken at `at`: `<stem>_<YYYYMMDD_HHMMSS>.db`.
pub fn backup_file_name(store: &Path, at: &DateTime<Local>) -> String {
    let stem = store
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "collection".to_string());
    format!("{}_{}.db", stem, at.format("%Y%m%d_%H%M%S"))
}

/// First free backup path in `dir`. Two backups in the same second get a
/// numeric suffix.
async fn free_path(dir: &Path, store: &Path) -> DbResult<PathBuf> {
    let name = backup_file_name(store, &Local::now());
    let candidate = dir.join(&name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let base = name.trim_end_matches(".db");
    for n in 1.. {
        let candidate = dir.join(format!("{}_{}.db", base, n));
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    Err(DbError::Internal("no free backup name".to_string()))
}

/// Writes a snapshot of the committed contents of `store` into `dir`.
pub(crate) async fn snapshot(store: &Path, dir: &Path, busy_timeout: Duration) -> DbResult<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let target = free_path(dir, store).await?;

    let mut conn = SqliteConnection::connect_with(&connect_options(store, true, busy_timeout)).await?;
    sqlx::query("VACUUM INTO ?1")
        .bind(target.to_string_lossy().into_owned())
        .execute(&mut conn)
        .await
        .map_err(|e| DbError::Io(format!("backup to {} failed: {}", target.display(), e)))?;
    conn.close().await?;

    info!(backup = %target.display(), "Collection backed up");
    Ok(target)
}
