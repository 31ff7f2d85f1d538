//! # Collection Schema
//!
//! Current on-disk layout and the value codec between [`FieldValue`] and
//! SQLite columns.
//!
//! ## Tables (version 5)
//! ```text
//! ┌──────────────┐  ┌──────────────────────────┐  ┌──────────────────┐
//! │  settings    │  │  coins                   │  │  fields          │
//! │──────────────│  │──────────────────────────│  │──────────────────│
//! │ title  UNQ   │  │ id        INTEGER PK     │  │ id        PK     │
//! │ value        │  │ uid       TEXT UNQ       │  │ name      UNQ    │
//! │              │  │ status    TEXT           │  │ title            │
//! │ Version = 5  │  │ <one column per field>   │  │ type             │
//! │ Password=phc │  │ createdat TEXT           │  │ enabled/visible  │
//! └──────────────┘  │ updatedat TEXT           │  │ position         │
//!                   └──────────────────────────┘  └──────────────────┘
//!                   ┌──────────────────────────┐
//!                   │  attachments             │
//!                   │ name PK │ data BLOB      │
//!                   └──────────────────────────┘
//! ```
//!
//! ## Column Encoding
//! | FieldValue  | Column  | Stored as                     |
//! |-------------|---------|-------------------------------|
//! | Text        | TEXT    | as is                         |
//! | Integer     | INTEGER | as is                         |
//! | Real        | REAL    | as is                         |
//! | Money       | INTEGER | cents                         |
//! | Date        | TEXT    | `YYYY-MM-DD`                  |
//! | DateTime    | TEXT    | RFC 3339, microseconds, `Z`   |
//! | Image       | BLOB    | raw bytes                     |
//!
//! Blank values are written as NULL. Column names only ever come from the
//! field catalog and are always quoted.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound, Utc};
use numis_core::{FieldCatalog, FieldType, FieldValue, Item, ItemId, ItemStatus, Money};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection};
use tracing::debug;

use crate::error::{DbError, DbResult};

/// Schema version written by this release.
pub const CURRENT_VERSION: u32 = 5;

pub(crate) const SETTING_VERSION: &str = "Version";
pub(crate) const SETTING_PASSWORD: &str = "Password";

pub(crate) type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

// =============================================================================
// Identifiers and Timestamps
// =============================================================================

/// Quotes a column name for use in SQL text.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Current time at storage precision.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, text: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DbError::WrongFormat(format!("bad timestamp in {}: {}", column, e)))
}

fn format_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

// =============================================================================
// Value Codec
// =============================================================================

/// Binds one field value in its storage representation.
pub(crate) fn bind_value<'q>(query: SqliteQuery<'q>, value: &FieldValue) -> SqliteQuery<'q> {
    match value {
        v if v.is_blank() => query.bind(None::<String>),
        FieldValue::Text(s) => query.bind(s.clone()),
        FieldValue::Integer(n) => query.bind(*n),
        FieldValue::Real(x) => query.bind(*x),
        FieldValue::Money(m) => query.bind(m.cents()),
        FieldValue::Date(d) => query.bind(format_date(d)),
        FieldValue::DateTime(ts) => query.bind(format_timestamp(ts)),
        FieldValue::Image(bytes) => query.bind(bytes.clone()),
    }
}

/// Binds a value or NULL.
pub(crate) fn bind_optional<'q>(query: SqliteQuery<'q>, value: Option<&FieldValue>) -> SqliteQuery<'q> {
    match value {
        Some(value) => bind_value(query, value),
        None => query.bind(None::<String>),
    }
}

/// Reads one column into a field value. NULL and empty text decode to `None`.
pub(crate) fn decode_value(row: &SqliteRow, name: &str, field_type: FieldType) -> DbResult<Option<FieldValue>> {
    let value = match field_type {
        FieldType::String | FieldType::ShortString | FieldType::Text | FieldType::Status => row
            .try_get::<Option<String>, _>(name)?
            .filter(|s| !s.is_empty())
            .map(FieldValue::Text),
        FieldType::Number | FieldType::BigInt => {
            row.try_get::<Option<i64>, _>(name)?.map(FieldValue::Integer)
        }
        FieldType::Value => row.try_get::<Option<f64>, _>(name)?.map(FieldValue::Real),
        FieldType::Money => row
            .try_get::<Option<i64>, _>(name)?
            .map(|cents| FieldValue::Money(Money::from_cents(cents))),
        FieldType::Date => match row.try_get::<Option<String>, _>(name)? {
            Some(text) if !text.is_empty() => Some(FieldValue::Date(
                NaiveDate::parse_from_str(&text, "%Y-%m-%d").map_err(|e| {
                    DbError::WrongFormat(format!("bad date in {}: {}", name, e))
                })?,
            )),
            _ => None,
        },
        FieldType::DateTime => match row.try_get::<Option<String>, _>(name)? {
            Some(text) if !text.is_empty() => Some(FieldValue::DateTime(parse_timestamp(name, &text)?)),
            _ => None,
        },
        FieldType::Image => row
            .try_get::<Option<Vec<u8>>, _>(name)?
            .filter(|bytes| !bytes.is_empty())
            .map(FieldValue::Image),
    };
    Ok(value)
}

/// Column list matching [`decode_item`].
pub(crate) fn item_columns(catalog: &FieldCatalog) -> String {
    let mut columns = vec![
        "uid".to_string(),
        "status".to_string(),
        "createdat".to_string(),
        "updatedat".to_string(),
    ];
    columns.extend(catalog.user_fields().map(|f| quote_ident(&f.name)));
    columns.join(", ")
}

/// Builds an item from a row selected with [`item_columns`].
pub(crate) fn decode_item(row: &SqliteRow, catalog: &FieldCatalog) -> DbResult<Item> {
    let uid: String = row.try_get("uid")?;
    let status = match row.try_get::<Option<String>, _>("status")? {
        Some(text) if !text.is_empty() => text
            .parse::<ItemStatus>()
            .map_err(|_| DbError::WrongFormat(format!("unknown status '{}'", text)))?,
        _ => ItemStatus::default(),
    };
    let created_at = parse_timestamp("createdat", &row.try_get::<String, _>("createdat")?)?;
    let updated_at = parse_timestamp("updatedat", &row.try_get::<String, _>("updatedat")?)?;

    let mut fields = std::collections::BTreeMap::new();
    for field in catalog.user_fields() {
        if let Some(value) = decode_value(row, &field.name, field.field_type)? {
            fields.insert(field.name.clone(), value);
        }
    }

    Ok(Item {
        id: ItemId::from(uid),
        status,
        fields,
        created_at,
        updated_at,
    })
}

// =============================================================================
// Schema Creation
// =============================================================================

/// DDL of the current `coins` table.
pub(crate) fn coins_table_sql(catalog: &FieldCatalog) -> String {
    let mut columns = vec![
        "id INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
        "uid TEXT NOT NULL".to_string(),
        "status TEXT NOT NULL".to_string(),
    ];
    columns.extend(
        catalog
            .user_fields()
            .map(|f| format!("{} {}", quote_ident(&f.name), f.field_type.sql_type())),
    );
    columns.push("createdat TEXT NOT NULL".to_string());
    columns.push("updatedat TEXT NOT NULL".to_string());

    format!("CREATE TABLE coins ({})", columns.join(", "))
}

pub(crate) const ATTACHMENTS_TABLE_SQL: &str =
    "CREATE TABLE attachments (name TEXT PRIMARY KEY, data BLOB NOT NULL, attached_at TEXT NOT NULL)";

/// Creates every table of the current schema and stamps the version.
///
/// Runs on an empty database inside the caller's transaction.
pub(crate) async fn create_schema(conn: &mut SqliteConnection, catalog: &FieldCatalog) -> DbResult<()> {
    debug!(version = CURRENT_VERSION, "Creating collection schema");

    sqlx::query("CREATE TABLE settings (title TEXT NOT NULL UNIQUE, value TEXT)")
        .execute(&mut *conn)
        .await?;
    sqlx::query(&coins_table_sql(catalog)).execute(&mut *conn).await?;
    sqlx::query("CREATE UNIQUE INDEX coins_uid ON coins (uid)")
        .execute(&mut *conn)
        .await?;
    sqlx::query(
        "CREATE TABLE fields (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, \
         title TEXT NOT NULL, type TEXT NOT NULL, enabled INTEGER NOT NULL, \
         visible INTEGER NOT NULL, position INTEGER NOT NULL)",
    )
    .execute(&mut *conn)
    .await?;
    sqlx::query(ATTACHMENTS_TABLE_SQL).execute(&mut *conn).await?;

    crate::repository::fields::FieldRepository::new(&mut *conn)
        .insert_all(catalog)
        .await?;
    crate::repository::settings::SettingsRepository::new(&mut *conn)
        .set_version(CURRENT_VERSION)
        .await?;

    Ok(())
}
