//! # Schema Migrations
//!
//! Upgrades collection files written by older releases.
//!
//! ## Version Chain
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Migration Chain                                    │
//! │                                                                         │
//! │  v1 ──► v2   add createdat / updatedat, backfill                       │
//! │  v2 ──► v3   add uid, one UUID per item (cancellable per item)         │
//! │  v3 ──► v4   money columns REAL units → INTEGER cents                  │
//! │  v4 ──► v5   fields table gets name/type/visible/position,             │
//! │              attachments table                                          │
//! │                                                                         │
//! │  Steps run strictly in order, one transaction each.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Working Copy
//! ```text
//!   coins.db ──copy──► coins.db.migrating ──steps──► ok? ──rename──► coins.db
//!                                                     │
//!                                                     └─ error / cancel ──► delete copy
//! ```
//! The original file is never written until every step has succeeded, so
//! a failed or cancelled migration leaves it at its old version.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::BoxFuture;
use numis_core::FieldCatalog;
use sqlx::{Connection, SqliteConnection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::settings::SettingsRepository;
use crate::schema::{format_timestamp, now, quote_ident, ATTACHMENTS_TABLE_SQL, CURRENT_VERSION};
use crate::store::connect_options;

/// Signature of one migration step. Runs inside the step's transaction.
pub type StepFn =
    for<'c> fn(&'c mut SqliteConnection, &'c CancellationToken) -> BoxFuture<'c, DbResult<()>>;

/// One `v_from → v_from+1` transformation.
#[derive(Clone, Copy)]
pub struct MigrationStep {
    pub from: u32,
    pub name: &'static str,
    pub apply: StepFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("name", &self.name)
            .finish()
    }
}

/// What `open` needs to know before deciding how to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Probe {
    pub version: u32,
    pub password_hash: Option<String>,
}

/// Reads the version marker and password hash without changing the file.
pub(crate) async fn probe(path: &Path, busy_timeout: Duration) -> DbResult<Probe> {
    let wrong_format = |_| DbError::WrongFormat(path.display().to_string());

    let mut conn = SqliteConnection::connect_with(&connect_options(path, true, busy_timeout))
        .await
        .map_err(|e| match e {
            sqlx::Error::Io(io) => DbError::Io(io.to_string()),
            _ => DbError::WrongFormat(path.display().to_string()),
        })?;

    let mut settings = SettingsRepository::new(&mut conn);
    let version = settings.version().await.map_err(wrong_format)?;
    let password_hash = settings.password_hash().await.map_err(wrong_format)?;
    conn.close().await?;

    Ok(Probe {
        version,
        password_hash,
    })
}

/// Reads the schema version of a collection file without opening it as a store.
pub async fn read_version(path: impl AsRef<Path>) -> DbResult<u32> {
    Ok(probe(path.as_ref(), Duration::from_secs(5)).await?.version)
}

fn working_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".migrating");
    PathBuf::from(name)
}

// =============================================================================
// Migrator
// =============================================================================

/// Applies the version chain to a collection file.
#[derive(Debug, Clone)]
pub struct Migrator {
    steps: Vec<MigrationStep>,
    busy_timeout: Duration,
}

impl Migrator {
    /// The chain that brings any supported file to [`CURRENT_VERSION`].
    pub fn standard() -> Self {
        Migrator::with_steps(vec![
            MigrationStep {
                from: 1,
                name: "add timestamps",
                apply: add_timestamps,
            },
            MigrationStep {
                from: 2,
                name: "assign item uids",
                apply: assign_uids,
            },
            MigrationStep {
                from: 3,
                name: "money to cents",
                apply: money_to_cents,
            },
            MigrationStep {
                from: 4,
                name: "extend fields and attachments",
                apply: extend_fields,
            },
        ])
    }

    /// A custom chain, ordered by `from`.
    pub fn with_steps(mut steps: Vec<MigrationStep>) -> Self {
        steps.sort_by_key(|s| s.from);
        Migrator {
            steps,
            busy_timeout: Duration::from_secs(5),
        }
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Version reached after the last step.
    pub fn target(&self) -> u32 {
        self.steps.last().map_or(CURRENT_VERSION, |s| s.from + 1)
    }

    /// Migrates the file at `path` from `from_version` to [`target`](Self::target).
    ///
    /// Returns the reached version. A file already at the target is left
    /// alone. The caller must hold the store lock.
    pub async fn migrate(&self, path: &Path, from_version: u32, cancel: &CancellationToken) -> DbResult<u32> {
        let target = self.target();
        if from_version == target {
            debug!(version = from_version, "Collection is current, nothing to migrate");
            return Ok(from_version);
        }
        if from_version > target {
            return Err(DbError::NewerVersion {
                found: from_version,
                supported: target,
            });
        }

        info!(
            path = %path.display(),
            from = from_version,
            to = target,
            "Migrating collection"
        );

        let working = working_path(path);
        if tokio::fs::try_exists(&working).await? {
            warn!(path = %working.display(), "Removing stale migration copy");
            tokio::fs::remove_file(&working).await?;
        }
        tokio::fs::copy(path, &working).await?;

        match self.run_steps(&working, from_version, cancel).await {
            Ok(version) => {
                tokio::fs::rename(&working, path).await?;
                info!(version, "Migration complete");
                Ok(version)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&working).await {
                    warn!(path = %working.display(), error = %rm, "Failed to remove migration copy");
                }
                warn!(error = %e, "Migration aborted, original collection untouched");
                Err(e)
            }
        }
    }

    async fn run_steps(&self, working: &Path, from_version: u32, cancel: &CancellationToken) -> DbResult<u32> {
        let mut conn = SqliteConnection::connect_with(&connect_options(working, false, self.busy_timeout))
            .await
            .map_err(|e| DbError::migration(from_version, e))?;

        let mut version = from_version;
        for step in self.steps.iter().filter(|s| s.from >= from_version) {
            if cancel.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            if step.from != version {
                return Err(DbError::migration(version, format!("no step from version {}", version)));
            }

            debug!(from = step.from, step = step.name, "Applying migration step");
            apply_step(&mut conn, step, cancel).await.map_err(|e| match e {
                DbError::Cancelled | DbError::MigrationFailed { .. } => e,
                other => DbError::migration(step.from, other),
            })?;
            version = step.from + 1;
        }

        if version != self.target() {
            return Err(DbError::migration(version, "chain does not reach the target version"));
        }

        conn.close().await?;
        Ok(version)
    }
}

/// Runs one step in its own transaction, guarded by the version marker.
async fn apply_step(conn: &mut SqliteConnection, step: &MigrationStep, cancel: &CancellationToken) -> DbResult<()> {
    let mut tx = conn.begin().await?;

    let current = SettingsRepository::new(&mut *tx).version().await?;
    if current > step.from {
        debug!(from = step.from, current, "Step already applied");
        return Ok(());
    }
    if current < step.from {
        return Err(DbError::migration(
            step.from,
            format!("collection is at version {}", current),
        ));
    }

    (step.apply)(&mut *tx, cancel).await?;
    SettingsRepository::new(&mut *tx).set_version(step.from + 1).await?;
    tx.commit().await?;
    Ok(())
}

// =============================================================================
// Steps
// =============================================================================

fn add_timestamps<'c>(conn: &'c mut SqliteConnection, _cancel: &'c CancellationToken) -> BoxFuture<'c, DbResult<()>> {
    Box::pin(async move {
        sqlx::query("ALTER TABLE coins ADD COLUMN createdat TEXT")
            .execute(&mut *conn)
            .await?;
        sqlx::query("ALTER TABLE coins ADD COLUMN updatedat TEXT")
            .execute(&mut *conn)
            .await?;
        sqlx::query("UPDATE coins SET createdat = ?1, updatedat = ?1")
            .bind(format_timestamp(&now()))
            .execute(&mut *conn)
            .await?;
        Ok(())
    })
}

fn assign_uids<'c>(conn: &'c mut SqliteConnection, cancel: &'c CancellationToken) -> BoxFuture<'c, DbResult<()>> {
    Box::pin(async move {
        sqlx::query("ALTER TABLE coins ADD COLUMN uid TEXT")
            .execute(&mut *conn)
            .await?;

        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM coins ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        for id in &ids {
            if cancel.is_cancelled() {
                return Err(DbError::Cancelled);
            }
            sqlx::query("UPDATE coins SET uid = ?1 WHERE id = ?2")
                .bind(uuid::Uuid::new_v4().to_string())
                .bind(id)
                .execute(&mut *conn)
                .await?;
        }

        sqlx::query("CREATE UNIQUE INDEX coins_uid ON coins (uid)")
            .execute(&mut *conn)
            .await?;
        debug!(items = ids.len(), "Item uids assigned");
        Ok(())
    })
}

fn money_to_cents<'c>(conn: &'c mut SqliteConnection, _cancel: &'c CancellationToken) -> BoxFuture<'c, DbResult<()>> {
    Box::pin(async move {
        let money: Vec<String> = FieldCatalog::builtin()
            .money_fields()
            .map(str::to_string)
            .collect();

        for name in &money {
            let column = quote_ident(name);
            let cents = quote_ident(&format!("{}_cents", name));
            let statements = [
                format!("ALTER TABLE coins ADD COLUMN {cents} INTEGER"),
                format!(
                    "UPDATE coins SET {cents} = CAST(ROUND({column} * 100) AS INTEGER) \
                     WHERE {column} IS NOT NULL AND {column} <> ''"
                ),
                format!("ALTER TABLE coins DROP COLUMN {column}"),
                format!("ALTER TABLE coins RENAME COLUMN {cents} TO {column}"),
            ];
            for sql in &statements {
                sqlx::query(sql).execute(&mut *conn).await?;
            }
        }
        Ok(())
    })
}

/// Field names of the first format's `fields` table, indexed by row id.
const LEGACY_FIELD_IDS: [&str; 71] = [
    "id", "title", "value", "unit", "country", "year", "period", "mint", "mintmark",
    "issuedate", "type", "series", "subjectshort", "status", "metal", "fineness", "form",
    "diameter", "thick", "mass", "grade", "edge", "edgelabel", "obvrev", "quality",
    "mintage", "dateemis", "catalognum1", "catalognum2", "catalognum3", "catalognum4",
    "rarity", "price1", "price2", "price3", "price4", "variety", "obversevar", "reversevar",
    "edgevar", "paydate", "payprice", "totalpayprice", "saller", "payplace", "payinfo",
    "saledate", "saleprice", "totalsaleprice", "buyer", "saleplace", "saleinfo", "note",
    "image", "obverseimg", "obversedesign", "obversedesigner", "reverseimg", "reversedesign",
    "reversedesigner", "edgeimg", "subject", "photo1", "photo2", "photo3", "photo4", "defect",
    "storage", "features", "createdat", "updatedat",
];

/// Name of the field a legacy `fields` row describes.
fn legacy_field_name(id: i64) -> Option<&'static str> {
    usize::try_from(id).ok().and_then(|i| LEGACY_FIELD_IDS.get(i).copied())
}

fn extend_fields<'c>(conn: &'c mut SqliteConnection, _cancel: &'c CancellationToken) -> BoxFuture<'c, DbResult<()>> {
    Box::pin(async move {
        for sql in [
            "ALTER TABLE fields ADD COLUMN name TEXT",
            "ALTER TABLE fields ADD COLUMN type TEXT",
            "ALTER TABLE fields ADD COLUMN visible INTEGER NOT NULL DEFAULT 1",
            "ALTER TABLE fields ADD COLUMN position INTEGER",
        ] {
            sqlx::query(sql).execute(&mut *conn).await?;
        }

        let catalog = FieldCatalog::builtin();
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM fields ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        for id in ids {
            match legacy_field_name(id).filter(|name| catalog.contains(name)) {
                Some(name) => {
                    sqlx::query("UPDATE fields SET name = ?1 WHERE id = ?2")
                        .bind(name)
                        .bind(id)
                        .execute(&mut *conn)
                        .await?;
                }
                None => debug!(id, "Dropping legacy field row"),
            }
        }

        for (position, field) in catalog.iter().enumerate() {
            let updated = sqlx::query(
                "UPDATE fields SET type = ?1, position = ?2, title = COALESCE(title, ?3), \
                 enabled = CASE WHEN ?4 THEN 1 ELSE COALESCE(enabled, 1) END WHERE name = ?5",
            )
            .bind(field.field_type.as_str())
            .bind(position as i64)
            .bind(&field.title)
            .bind(field.system)
            .bind(&field.name)
            .execute(&mut *conn)
            .await?;

            if updated.rows_affected() == 0 {
                sqlx::query(
                    "INSERT INTO fields (title, enabled, name, type, visible, position) \
                     VALUES (?1, 1, ?2, ?3, 1, ?4)",
                )
                .bind(&field.title)
                .bind(&field.name)
                .bind(field.field_type.as_str())
                .bind(position as i64)
                .execute(&mut *conn)
                .await?;
            }
        }

        sqlx::query("DELETE FROM fields WHERE name IS NULL")
            .execute(&mut *conn)
            .await?;
        sqlx::query("CREATE UNIQUE INDEX fields_name ON fields (name)")
            .execute(&mut *conn)
            .await?;
        sqlx::query(ATTACHMENTS_TABLE_SQL).execute(&mut *conn).await?;
        Ok(())
    })
}

// =============================================================================
// Legacy Fixtures
// =============================================================================

/// Builders for files in the first collection format.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use sqlx::sqlite::SqliteConnectOptions;

    /// A legacy coin: country, year and face value in currency units.
    pub struct LegacyCoin<'a> {
        pub country: &'a str,
        pub year: i64,
        pub value: Option<f64>,
        pub status: &'a str,
    }

    /// `fields` rows as the first format wrote them: every legacy id with
    /// its default title, `id` and the timestamps disabled.
    pub fn legacy_field_rows() -> Vec<(i64, String, bool)> {
        let catalog = FieldCatalog::builtin();
        LEGACY_FIELD_IDS
            .iter()
            .enumerate()
            .map(|(id, name)| {
                let title = catalog.get(name).map_or("ID", |f| f.title.as_str());
                let enabled = !matches!(*name, "id" | "createdat" | "updatedat");
                (id as i64, title.to_string(), enabled)
            })
            .collect()
    }

    /// Writes a version 1 collection at `path`.
    pub async fn create_v1(path: &Path, coins: &[LegacyCoin<'_>]) {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let mut conn = SqliteConnection::connect_with(&options).await.unwrap();
        let catalog = FieldCatalog::builtin();

        let columns: Vec<String> = catalog
            .user_fields()
            .map(|f| {
                let sql_type = if f.field_type == numis_core::FieldType::Money {
                    "REAL"
                } else {
                    f.field_type.sql_type()
                };
                format!("{} {}", quote_ident(&f.name), sql_type)
            })
            .collect();

        let ddl = [
            "CREATE TABLE settings (title CHAR NOT NULL UNIQUE, value CHAR)".to_string(),
            "INSERT INTO settings (title, value) VALUES ('Version', '1')".to_string(),
            format!(
                "CREATE TABLE coins (id INTEGER PRIMARY KEY AUTOINCREMENT, status TEXT, {})",
                columns.join(", ")
            ),
            "CREATE TABLE fields (id INTEGER NOT NULL PRIMARY KEY, title CHAR, enabled INTEGER)"
                .to_string(),
        ];
        for sql in &ddl {
            sqlx::query(sql).execute(&mut conn).await.unwrap();
        }

        for (id, title, enabled) in legacy_field_rows() {
            sqlx::query("INSERT INTO fields (id, title, enabled) VALUES (?1, ?2, ?3)")
                .bind(id)
                .bind(title)
                .bind(enabled)
                .execute(&mut conn)
                .await
                .unwrap();
        }

        for coin in coins {
            sqlx::query("INSERT INTO coins (status, country, year, \"value\") VALUES (?1, ?2, ?3, ?4)")
                .bind(coin.status)
                .bind(coin.country)
                .bind(coin.year)
                .bind(coin.value)
                .execute(&mut conn)
                .await
                .unwrap();
        }

        conn.close().await.unwrap();
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
