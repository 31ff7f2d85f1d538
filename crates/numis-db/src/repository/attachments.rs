//! # Attachment Repository
//!
//! Named blobs in the `attachments` table. The embedded reference is the
//! only attachment today.

use sqlx::SqliteConnection;

use crate::error::DbResult;
use crate::schema::{format_timestamp, now};

#[derive(Debug)]
pub struct AttachmentRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AttachmentRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AttachmentRepository { conn }
    }

    pub async fn get(&mut self, name: &str) -> DbResult<Option<Vec<u8>>> {
        let data = sqlx::query_scalar("SELECT data FROM attachments WHERE name = ?1")
            .bind(name)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(data)
    }

    pub async fn exists(&mut self, name: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM attachments WHERE name = ?1)")
            .bind(name)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(exists)
    }

    /// Inserts a new attachment. Fails if the name is taken.
    pub async fn insert(&mut self, name: &str, data: &[u8]) -> DbResult<()> {
        sqlx::query("INSERT INTO attachments (name, data, attached_at) VALUES (?1, ?2, ?3)")
            .bind(name)
            .bind(data)
            .bind(format_timestamp(&now()))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    /// Removes an attachment. Returns whether one existed.
    pub async fn remove(&mut self, name: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM attachments WHERE name = ?1")
            .bind(name)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
