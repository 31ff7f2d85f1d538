//! # Item Repository
//!
//! Database operations for collection items (the `coins` table).
//!
//! ## Lazy Queries
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    How Item Streams Work                                │
//! │                                                                         │
//! │  store.query(predicate, order)                                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT ... WHERE <predicate> ORDER BY <order>, id LIMIT 256 OFFSET 0  │
//! │       │  page of rows ──► decode ──► yield one Item at a time          │
//! │       ▼                                                                 │
//! │  SELECT ... LIMIT 256 OFFSET 256   (only when the consumer asks)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  short page ──► end of stream                                          │
//! │                                                                         │
//! │  The stream mutably borrows the session, so the store cannot change   │
//! │  underneath it. Every call starts over against the current state.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use numis_core::fields::FIELD_STATUS;
use numis_core::{
    CollectionSummary, CoreError, DistinctValues, FieldCatalog, FieldValue, Item, ItemChanges, ItemId,
    ItemStatus, Money, NewItem, Predicate, SortOrder,
};
use sqlx::{Row, SqliteConnection};
use tracing::debug;

use crate::error::{DbError, DbResult};
use crate::filter::{render_order, render_predicate};
use crate::schema::{
    bind_optional, bind_value, decode_item, decode_value, format_timestamp, item_columns, quote_ident,
};

/// Rows fetched per round trip by lazy queries.
pub const PAGE_SIZE: i64 = 256;

/// Lazy, finite sequence of items.
pub type ItemStream<'a> = BoxStream<'a, DbResult<Item>>;

/// Repository for item operations on the session connection.
#[derive(Debug)]
pub struct ItemRepository<'c> {
    conn: &'c mut SqliteConnection,
    catalog: &'c FieldCatalog,
}

impl<'c> ItemRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection, catalog: &'c FieldCatalog) -> Self {
        ItemRepository { conn, catalog }
    }

    /// Inserts an item and returns its id.
    ///
    /// Supplied ids and timestamps are kept; missing ones are filled in.
    pub async fn insert(&mut self, item: &NewItem, now: DateTime<Utc>) -> DbResult<ItemId> {
        let id = item.id.clone().unwrap_or_else(ItemId::generate);
        let created_at = item.created_at.unwrap_or(now);
        let updated_at = item.updated_at.unwrap_or(created_at);

        let present: Vec<(&String, &FieldValue)> =
            item.fields.iter().filter(|(_, v)| !v.is_blank()).collect();

        let mut columns = vec![
            "uid".to_string(),
            "status".to_string(),
            "createdat".to_string(),
            "updatedat".to_string(),
        ];
        columns.extend(present.iter().map(|(name, _)| quote_ident(name)));
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO coins ({}) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        let mut query = sqlx::query(&sql)
            .bind(id.as_str().to_string())
            .bind(item.status.as_str())
            .bind(format_timestamp(&created_at))
            .bind(format_timestamp(&updated_at));
        for (_, value) in &present {
            query = bind_value(query, value);
        }

        query
            .execute(&mut *self.conn)
            .await
            .map_err(|e| match DbError::from(e) {
                DbError::UniqueViolation { .. } => DbError::duplicate("uid", id.as_str()),
                other => other,
            })?;

        debug!(id = %id, fields = present.len(), "Item inserted");
        Ok(id)
    }

    /// Gets an item by id.
    pub async fn get(&mut self, id: &ItemId) -> DbResult<Option<Item>> {
        let sql = format!(
            "SELECT {} FROM coins WHERE uid = ?1",
            item_columns(self.catalog)
        );
        let row = sqlx::query(&sql)
            .bind(id.as_str())
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(|row| decode_item(&row, self.catalog)).transpose()
    }

    /// Applies a change set. Fields it does not name keep their values.
    pub async fn update(&mut self, id: &ItemId, changes: &ItemChanges, now: DateTime<Utc>) -> DbResult<()> {
        let mut assignments: Vec<String> = Vec::new();
        let mut values: Vec<&FieldValue> = Vec::new();
        for (name, value) in &changes.set {
            if value.is_blank() {
                assignments.push(format!("{} = NULL", quote_ident(name)));
            } else {
                assignments.push(format!("{} = ?", quote_ident(name)));
                values.push(value);
            }
        }
        for name in &changes.clear {
            assignments.push(format!("{} = NULL", quote_ident(name)));
        }
        if changes.status.is_some() {
            assignments.push("status = ?".to_string());
        }
        assignments.push("updatedat = ?".to_string());

        let sql = format!("UPDATE coins SET {} WHERE uid = ?", assignments.join(", "));
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        if let Some(status) = changes.status {
            query = query.bind(status.as_str());
        }
        let result = query
            .bind(format_timestamp(&now))
            .bind(id.as_str())
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", id.as_str()));
        }

        debug!(id = %id, set = changes.set.len(), cleared = changes.clear.len(), "Item updated");
        Ok(())
    }

    /// Overwrites status and every user field with `item`'s content.
    ///
    /// `updatedat` is taken from `item`, `createdat` is kept.
    pub async fn replace(&mut self, item: &Item) -> DbResult<()> {
        let user_fields: Vec<&str> = self.catalog.user_fields().map(|f| f.name.as_str()).collect();
        let mut assignments: Vec<String> = user_fields
            .iter()
            .map(|name| format!("{} = ?", quote_ident(name)))
            .collect();
        assignments.push("status = ?".to_string());
        assignments.push("updatedat = ?".to_string());

        let sql = format!("UPDATE coins SET {} WHERE uid = ?", assignments.join(", "));
        let mut query = sqlx::query(&sql);
        for name in &user_fields {
            query = bind_optional(query, item.fields.get(*name));
        }
        let result = query
            .bind(item.status.as_str())
            .bind(format_timestamp(&item.updated_at))
            .bind(item.id.as_str())
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", item.id.as_str()));
        }
        Ok(())
    }

    /// Deletes an item.
    pub async fn delete(&mut self, id: &ItemId) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM coins WHERE uid = ?1")
            .bind(id.as_str())
            .execute(&mut *self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Item", id.as_str()));
        }

        debug!(id = %id, "Item deleted");
        Ok(())
    }

    /// Number of items.
    pub async fn count(&mut self) -> DbResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM coins")
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count as u64)
    }

    /// Distinct non-blank values of a column, ascending, plus whether blanks exist.
    pub async fn distinct_values(&mut self, field: &str) -> DbResult<DistinctValues> {
        let definition = self.catalog.require(field)?;
        if !definition.field_type.is_filterable() {
            return Err(CoreError::NotFilterable(field.to_string()).into());
        }
        let column = quote_ident(&definition.name);

        let sql = format!(
            "SELECT DISTINCT {column} FROM coins \
             WHERE {column} IS NOT NULL AND {column} <> '' ORDER BY {column}"
        );
        let rows = sqlx::query(&sql).fetch_all(&mut *self.conn).await?;
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(value) = decode_value(row, &definition.name, definition.field_type)? {
                values.push(value);
            }
        }

        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM coins WHERE {column} IS NULL OR {column} = '')"
        );
        let has_blank: bool = sqlx::query_scalar(&sql).fetch_one(&mut *self.conn).await?;

        Ok(DistinctValues { values, has_blank })
    }

    /// Counts and money totals over the whole collection.
    pub async fn summary(&mut self) -> DbResult<CollectionSummary> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS n FROM coins GROUP BY status")
            .fetch_all(&mut *self.conn)
            .await?;

        let mut by_status = BTreeMap::new();
        let mut total = 0u64;
        for row in rows {
            let status: Option<String> = row.try_get(FIELD_STATUS)?;
            let n: i64 = row.try_get("n")?;
            let status = status
                .as_deref()
                .and_then(|s| s.parse::<ItemStatus>().ok())
                .unwrap_or_default();
            *by_status.entry(status).or_insert(0) += n as u64;
            total += n as u64;
        }

        let row = sqlx::query(
            "SELECT \
               COALESCE(SUM(\"totalpayprice\"), 0) AS paid, \
               COALESCE(SUM(\"totalsaleprice\"), 0) AS sold, \
               COALESCE(SUM(CASE WHEN status = 'owned' THEN \"value\" END), 0) AS owned, \
               COALESCE(SUM(CASE WHEN status = 'wish' THEN \"value\" END), 0) AS wish \
             FROM coins",
        )
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(CollectionSummary {
            total,
            by_status,
            total_paid: Money::from_cents(row.try_get("paid")?),
            total_sold: Money::from_cents(row.try_get("sold")?),
            owned_value: Money::from_cents(row.try_get("owned")?),
            wish_value: Money::from_cents(row.try_get("wish")?),
        })
    }

    /// Streams the items matching `predicate` in the requested order.
    pub fn query(self, predicate: &Predicate, order: Option<&SortOrder>) -> DbResult<ItemStream<'c>> {
        let filter = render_predicate(predicate);
        let order = render_order(order, self.catalog)?;
        let sql = format!(
            "SELECT {} FROM coins WHERE {} ORDER BY {} LIMIT ? OFFSET ?",
            item_columns(self.catalog),
            filter.sql,
            order
        );
        debug!(sql = %sql, binds = filter.binds.len(), "Item query");

        let cursor = PageCursor {
            conn: self.conn,
            sql,
            binds: filter.binds,
            catalog: self.catalog.clone(),
            offset: 0,
            exhausted: false,
        };

        let pages = stream::try_unfold(cursor, |mut cursor| async move {
            if cursor.exhausted {
                return Ok::<_, DbError>(None);
            }
            let page = cursor.next_page().await?;
            if page.is_empty() {
                return Ok(None);
            }
            Ok(Some((page, cursor)))
        });

        Ok(pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok::<Item, DbError>)))
            .try_flatten()
            .boxed())
    }
}

/// Paging state of a lazy query.
struct PageCursor<'c> {
    conn: &'c mut SqliteConnection,
    sql: String,
    binds: Vec<FieldValue>,
    catalog: FieldCatalog,
    offset: i64,
    exhausted: bool,
}

impl PageCursor<'_> {
    async fn next_page(&mut self) -> DbResult<Vec<Item>> {
        let mut query = sqlx::query(&self.sql);
        for value in &self.binds {
            query = bind_value(query, value);
        }
        let rows = query
            .bind(PAGE_SIZE)
            .bind(self.offset)
            .fetch_all(&mut *self.conn)
            .await?;

        let items = rows
            .iter()
            .map(|row| decode_item(row, &self.catalog))
            .collect::<DbResult<Vec<Item>>>()?;

        self.offset += items.len() as i64;
        if (items.len() as i64) < PAGE_SIZE {
            self.exhausted = true;
        }
        Ok(items)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{create_schema, now};
    use chrono::NaiveDate;
    use sqlx::Connection;

    async fn coins_db(catalog: &FieldCatalog) -> SqliteConnection {
        let mut conn = SqliteConnection::connect("sqlite::memory:").await.unwrap();
        create_schema(&mut conn, catalog).await.unwrap();
        conn
    }

    fn coin(country: &str, year: i64) -> NewItem {
        NewItem::new(ItemStatus::Owned)
            .with("country", FieldValue::text(country))
            .with("year", FieldValue::Integer(year))
    }

    #[tokio::test]
    async fn test_insert_and_get_all_types() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let item = NewItem::new(ItemStatus::Wish)
            .with("title", FieldValue::text("1 rouble"))
            .with("value", FieldValue::Money(Money::from_cents(100)))
            .with("mass", FieldValue::Real(19.99))
            .with("issuedate", FieldValue::Date(NaiveDate::from_ymd_opt(1924, 1, 1).unwrap()))
            .with("obverseimg", FieldValue::Image(vec![0x89, 0x50, 0x4e, 0x47]))
            .with("note", FieldValue::text(""));
        let id = repo.insert(&item, now()).await.unwrap();

        let stored = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, ItemStatus::Wish);
        assert_eq!(stored.field("value"), Some(&FieldValue::Money(Money::from_cents(100))));
        assert_eq!(stored.field("mass"), Some(&FieldValue::Real(19.99)));
        assert_eq!(stored.field("obverseimg"), Some(&FieldValue::Image(vec![0x89, 0x50, 0x4e, 0x47])));
        assert!(stored.field("note").is_none());
        assert_eq!(stored.created_at, stored.updated_at);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let mut item = coin("X", 1990);
        item.id = Some(ItemId::generate());
        repo.insert(&item, now()).await.unwrap();
        let result = repo.insert(&item, now()).await;
        assert!(matches!(result, Err(DbError::UniqueViolation { field, .. }) if field == "uid"));
    }

    #[tokio::test]
    async fn test_update_touches_only_named_fields() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let id = repo.insert(&coin("X", 1990), now()).await.unwrap();
        let changes = ItemChanges::new()
            .set("grade", FieldValue::text("XF"))
            .clear("country")
            .status(ItemStatus::Sale);
        repo.update(&id, &changes, now()).await.unwrap();

        let item = repo.get(&id).await.unwrap().unwrap();
        assert_eq!(item.field("grade"), Some(&FieldValue::text("XF")));
        assert_eq!(item.field("year"), Some(&FieldValue::Integer(1990)));
        assert!(item.field("country").is_none());
        assert_eq!(item.status, ItemStatus::Sale);
        assert!(item.updated_at >= item.created_at);

        let missing = repo.update(&ItemId::generate(), &changes, now()).await;
        assert!(matches!(missing, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_replace_overwrites_whole_item() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let id = repo.insert(&coin("X", 1990), now()).await.unwrap();
        let mut item = repo.get(&id).await.unwrap().unwrap();
        item.fields.remove("year");
        item.fields.insert("mint".into(), FieldValue::text("Paris"));
        item.status = ItemStatus::Sold;
        repo.replace(&item).await.unwrap();

        let stored = repo.get(&id).await.unwrap().unwrap();
        assert!(stored.same_content(&item));
        assert!(stored.field("year").is_none());
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let id = repo.insert(&coin("X", 1990), now()).await.unwrap();
        repo.insert(&coin("Y", 1990), now()).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        repo.delete(&id).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get(&id).await.unwrap().is_none());
        assert!(matches!(repo.delete(&id).await, Err(DbError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_query_spans_several_pages() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let total = PAGE_SIZE as usize * 2 + 7;
        for year in 0..total {
            repo.insert(&coin("X", year as i64), now()).await.unwrap();
        }

        let items: Vec<Item> = repo
            .query(&Predicate::match_all(), None)
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), total);
        let years: Vec<i64> = items
            .iter()
            .filter_map(|i| match i.field("year") {
                Some(FieldValue::Integer(y)) => Some(*y),
                _ => None,
            })
            .collect();
        assert_eq!(years, (0..total as i64).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_distinct_values() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        repo.insert(&coin("Y", 1990), now()).await.unwrap();
        repo.insert(&coin("X", 1990), now()).await.unwrap();
        repo.insert(&coin("X", 1985), now()).await.unwrap();
        repo.insert(&NewItem::new(ItemStatus::Owned), now()).await.unwrap();

        let countries = repo.distinct_values("country").await.unwrap();
        assert_eq!(countries.values, vec![FieldValue::text("X"), FieldValue::text("Y")]);
        assert!(countries.has_blank);

        let statuses = repo.distinct_values("status").await.unwrap();
        assert_eq!(statuses.values, vec![FieldValue::text("owned")]);
        assert!(!statuses.has_blank);

        assert!(repo.distinct_values("obverseimg").await.is_err());
    }

    #[tokio::test]
    async fn test_summary() {
        let catalog = FieldCatalog::builtin();
        let mut conn = coins_db(&catalog).await;
        let mut repo = ItemRepository::new(&mut conn, &catalog);

        let owned = NewItem::new(ItemStatus::Owned)
            .with("value", FieldValue::Money(Money::from_cents(500)))
            .with("totalpayprice", FieldValue::Money(Money::from_cents(1250)));
        let sold = NewItem::new(ItemStatus::Sold)
            .with("totalpayprice", FieldValue::Money(Money::from_cents(300)))
            .with("totalsaleprice", FieldValue::Money(Money::from_cents(900)));
        let wish = NewItem::new(ItemStatus::Wish).with("value", FieldValue::Money(Money::from_cents(2000)));
        for item in [&owned, &owned, &sold, &wish] {
            repo.insert(item, now()).await.unwrap();
        }

        let summary = repo.summary().await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.count(ItemStatus::Owned), 2);
        assert_eq!(summary.count(ItemStatus::Sold), 1);
        assert_eq!(summary.total_paid, Money::from_cents(2800));
        assert_eq!(summary.total_sold, Money::from_cents(900));
        assert_eq!(summary.owned_value, Money::from_cents(1000));
        assert_eq!(summary.wish_value, Money::from_cents(2000));
    }
}
