//! # Field Repository
//!
//! Persists field definitions (title, flags, display order) in the
//! `fields` table.

use numis_core::fields::{FIELD_CREATED_AT, FIELD_STATUS, FIELD_UPDATED_AT};
use numis_core::{FieldCatalog, FieldDefinition, FieldType};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Repository over the `fields` table.
#[derive(Debug)]
pub struct FieldRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> FieldRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        FieldRepository { conn }
    }

    /// Writes every definition of a fresh catalog.
    pub async fn insert_all(&mut self, catalog: &FieldCatalog) -> DbResult<()> {
        for (position, field) in catalog.iter().enumerate() {
            sqlx::query(
                "INSERT INTO fields (id, name, title, type, enabled, visible, position) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .bind(position as i64 + 1)
            .bind(&field.name)
            .bind(&field.title)
            .bind(field.field_type.as_str())
            .bind(field.enabled)
            .bind(field.visible)
            .bind(position as i64)
            .execute(&mut *self.conn)
            .await?;
        }

        debug!(count = catalog.len(), "Field definitions written");
        Ok(())
    }

    /// Loads the catalog in display order.
    pub async fn load(&mut self) -> DbResult<FieldCatalog> {
        let rows = sqlx::query(
            "SELECT name, title, type, enabled, visible FROM fields ORDER BY position, id",
        )
        .fetch_all(&mut *self.conn)
        .await?;

        let mut definitions = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let type_name: String = row.try_get("type")?;
            let field_type: FieldType = type_name
                .parse()
                .map_err(|_| DbError::WrongFormat(format!("unknown field type '{}'", type_name)))?;

            definitions.push(FieldDefinition {
                system: [FIELD_STATUS, FIELD_CREATED_AT, FIELD_UPDATED_AT].contains(&name.as_str()),
                title: row.try_get("title")?,
                enabled: row.try_get("enabled")?,
                visible: row.try_get("visible")?,
                name,
                field_type,
            });
        }

        Ok(FieldCatalog::from_definitions(definitions)?)
    }

    /// Stores the mutable part of a definition (title and flags).
    pub async fn update(&mut self, field: &FieldDefinition) -> DbResult<()> {
        let result = sqlx::query("UPDATE fields SET title = ?1, enabled = ?2, visible = ?3 WHERE name = ?4")
            .bind(&field.title)
            .bind(field.enabled)
            .bind(field.visible)
            .bind(&field.name)
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Field", &field.name));
        }
        Ok(())
    }
}
