//! # Settings Repository
//!
//! Key/value rows of the `settings` table: the schema version marker and
//! the password hash.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::schema::{SETTING_PASSWORD, SETTING_VERSION};

/// Repository over the `settings` table.
#[derive(Debug)]
pub struct SettingsRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SettingsRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SettingsRepository { conn }
    }

    /// Reads a setting. Missing rows are `None`.
    pub async fn get(&mut self, title: &str) -> DbResult<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT value FROM settings WHERE title = ?1")
                .bind(title)
                .fetch_optional(&mut *self.conn)
                .await?;
        Ok(value.flatten())
    }

    /// Inserts or replaces a setting.
    pub async fn set(&mut self, title: &str, value: &str) -> DbResult<()> {
        debug!(title = %title, "Writing setting");
        sqlx::query(
            "INSERT INTO settings (title, value) VALUES (?1, ?2) \
             ON CONFLICT(title) DO UPDATE SET value = excluded.value",
        )
        .bind(title)
        .bind(value)
        .execute(&mut *self.conn)
        .await?;
        Ok(())
    }

    pub async fn remove(&mut self, title: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM settings WHERE title = ?1")
            .bind(title)
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Reads the schema version marker.
    ///
    /// A missing marker or an unparseable one means the file is not a
    /// collection.
    pub async fn version(&mut self) -> DbResult<u32> {
        let text = self
            .get(SETTING_VERSION)
            .await?
            .ok_or_else(|| DbError::WrongFormat("missing version marker".to_string()))?;
        text.trim()
            .parse()
            .map_err(|_| DbError::WrongFormat(format!("bad version marker '{}'", text)))
    }

    pub async fn set_version(&mut self, version: u32) -> DbResult<()> {
        self.set(SETTING_VERSION, &version.to_string()).await
    }

    pub async fn password_hash(&mut self) -> DbResult<Option<String>> {
        Ok(self.get(SETTING_PASSWORD).await?.filter(|h| !h.is_empty()))
    }

    pub async fn set_password_hash(&mut self, hash: Option<&str>) -> DbResult<()> {
        match hash {
            Some(hash) => self.set(SETTING_PASSWORD, hash).await,
            None => self.remove(SETTING_PASSWORD).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Connection;

    async fn settings_db() -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        sqlx::query("CREATE TABLE settings (title TEXT NOT NULL UNIQUE, value TEXT)")
            .execute(&mut conn)
            .await
            .unwrap();
        conn
    }

    #[tokio::test]
    async fn test_set_get_remove() {
        let mut conn = settings_db().await;
        let mut repo = SettingsRepository::new(&mut conn);

        assert_eq!(repo.get("Theme").await.unwrap(), None);
        repo.set("Theme", "dark").await.unwrap();
        repo.set("Theme", "light").await.unwrap();
        assert_eq!(repo.get("Theme").await.unwrap().as_deref(), Some("light"));

        repo.remove("Theme").await.unwrap();
        assert_eq!(repo.get("Theme").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_version_marker() {
        let mut conn = settings_db().await;
        let mut repo = SettingsRepository::new(&mut conn);

        assert!(matches!(repo.version().await, Err(DbError::WrongFormat(_))));
        repo.set_version(3).await.unwrap();
        assert_eq!(repo.version().await.unwrap(), 3);

        repo.set("Version", "three").await.unwrap();
        assert!(matches!(repo.version().await, Err(DbError::WrongFormat(_))));
    }
}
