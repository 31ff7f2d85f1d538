//! # Filter Engine
//!
//! Applies compiled predicates to a store.
//!
//! ## Flow
//! ```text
//!  FilterCriteria ──compile──► CompiledFilter ──render──► WHERE / ORDER BY
//!                                 │ too complex?                │
//!                                 ▼                             ▼
//!                   info!("Filter is too complex...")   Store::query (lazy)
//!                   predicate = match-all                       │
//!                                                               ▼
//!                                                cancel check per item
//!                                                               │
//!                                                               ▼
//!                                                          Vec<Item>
//! ```
//!
//! ## SQL Rendering
//! | Clause                      | SQL                                        |
//! |-----------------------------|--------------------------------------------|
//! | OneOf [a, b]                | `"f" IN (?, ?)`                            |
//! | OneOf [a] + blanks          | `("f" IN (?) OR "f" IS NULL OR "f" = '')`  |
//! | Blank                       | `("f" IS NULL OR "f" = '')`                |
//! | NonBlank                    | `("f" IS NOT NULL AND "f" <> '')`          |
//! | Contains "x"                | `"f" LIKE '%x%' ESCAPE '\'`                |
//!
//! Ordering always ends with `id ASC`, so rows that tie on the sort column
//! keep store order in both directions.

use futures_util::TryStreamExt;
use numis_core::filter::{Clause, ClauseTest};
use numis_core::{
    compile, CompiledFilter, CoreError, FieldCatalog, FieldValue, FilterCriteria, FilterLimits,
    Item, Predicate, SortDirection, SortOrder,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::schema::quote_ident;
use crate::store::Store;

// =============================================================================
// SQL Rendering
// =============================================================================

/// WHERE clause text plus its positional binds.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlFilter {
    pub sql: String,
    pub binds: Vec<FieldValue>,
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    escaped.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn render_clause(clause: &Clause, binds: &mut Vec<FieldValue>) -> String {
    let column = quote_ident(&clause.field);
    let blank = format!("({column} IS NULL OR {column} = '')");

    match &clause.test {
        ClauseTest::Blank => blank,
        ClauseTest::NonBlank => format!("({column} IS NOT NULL AND {column} <> '')"),
        ClauseTest::Contains(text) => {
            binds.push(FieldValue::Text(escape_like(text)));
            format!("{column} LIKE ? ESCAPE '\\'")
        }
        ClauseTest::OneOf {
            values,
            include_blank,
        } => {
            let listed = values.iter().filter(|v| !v.is_blank()).count();
            let mut alternatives = Vec::new();
            if listed > 0 {
                binds.extend(values.iter().filter(|v| !v.is_blank()).cloned());
                let placeholders = vec!["?"; listed].join(", ");
                alternatives.push(format!("{column} IN ({placeholders})"));
            }
            if *include_blank || listed < values.len() {
                alternatives.push(blank);
            }
            match alternatives.len() {
                0 => "0".to_string(),
                1 => alternatives.remove(0),
                _ => format!("({})", alternatives.join(" OR ")),
            }
        }
    }
}

/// Renders a predicate. Match-all renders as `1`.
pub(crate) fn render_predicate(predicate: &Predicate) -> SqlFilter {
    let mut binds = Vec::new();
    let parts: Vec<String> = predicate
        .clauses()
        .iter()
        .map(|clause| render_clause(clause, &mut binds))
        .collect();

    let sql = if parts.is_empty() {
        "1".to_string()
    } else {
        parts.join(" AND ")
    };
    SqlFilter { sql, binds }
}

/// Renders an ORDER BY list with the row-order tie breaker.
pub(crate) fn render_order(order: Option<&SortOrder>, catalog: &FieldCatalog) -> DbResult<String> {
    let Some(order) = order else {
        return Ok("id ASC".to_string());
    };

    let field = catalog.require(&order.field)?;
    if !field.field_type.is_filterable() {
        return Err(CoreError::NotFilterable(order.field.clone()).into());
    }
    let direction = match order.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };
    Ok(format!("{} {}, id ASC", quote_ident(&field.name), direction))
}

// =============================================================================
// Filter Engine
// =============================================================================

/// Compiles view filters and runs them against a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilterEngine {
    limits: FilterLimits,
}

impl FilterEngine {
    pub fn new(limits: FilterLimits) -> Self {
        FilterEngine { limits }
    }

    pub fn limits(&self) -> FilterLimits {
        self.limits
    }

    /// Compiles criteria. An over-complex filter is logged and dropped.
    pub fn compile(&self, criteria: &FilterCriteria, catalog: &FieldCatalog) -> DbResult<CompiledFilter> {
        let compiled = compile(criteria, catalog, &self.limits)?;
        if compiled.too_complex {
            info!(
                criteria = criteria.len(),
                max_combinations = self.limits.max_combinations,
                "Filter is too complex. Will be ignored"
            );
        }
        Ok(compiled)
    }

    /// Runs a predicate and collects the ordered result.
    ///
    /// The token is checked before every item; a cancelled run returns
    /// `Cancelled` and leaves the store untouched.
    pub async fn apply(
        &self,
        store: &mut Store,
        predicate: &Predicate,
        order: Option<&SortOrder>,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<Item>> {
        let mut items = Vec::new();
        let mut stream = store.query(predicate, order).await?;

        loop {
            if cancel.is_cancelled() {
                debug!(collected = items.len(), "Filter cancelled");
                return Err(DbError::Cancelled);
            }
            match stream.try_next().await? {
                Some(item) => items.push(item),
                None => break,
            }
        }

        debug!(count = items.len(), "Filter applied");
        Ok(items)
    }

    /// Compiles and applies in one step.
    pub async fn view(
        &self,
        store: &mut Store,
        criteria: &FilterCriteria,
        order: Option<&SortOrder>,
        cancel: &CancellationToken,
    ) -> DbResult<Vec<Item>> {
        let compiled = self.compile(criteria, store.catalog())?;
        self.apply(store, &compiled.predicate, order, cancel).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use numis_core::{FilterCriterion, ItemStatus, NewItem};

    fn compiled(criteria: &[(&str, FilterCriterion)]) -> Predicate {
        let criteria: FilterCriteria = criteria
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        compile(&criteria, &FieldCatalog::builtin(), &FilterLimits::default())
            .unwrap()
            .predicate
    }

    #[test]
    fn test_render_match_all() {
        let rendered = render_predicate(&Predicate::match_all());
        assert_eq!(rendered.sql, "1");
        assert!(rendered.binds.is_empty());
    }

    #[test]
    fn test_render_one_of_with_blanks() {
        let predicate = compiled(&[(
            "country",
            FilterCriterion::OneOf {
                values: vec![FieldValue::text("X"), FieldValue::text("Y")],
                include_blank: true,
            },
        )]);
        let rendered = render_predicate(&predicate);
        assert_eq!(
            rendered.sql,
            "(\"country\" IN (?, ?) OR (\"country\" IS NULL OR \"country\" = ''))"
        );
        assert_eq!(rendered.binds.len(), 2);
    }

    #[test]
    fn test_render_empty_one_of_matches_nothing() {
        let predicate = compiled(&[("country", FilterCriterion::one_of([]))]);
        assert_eq!(render_predicate(&predicate).sql, "0");
    }

    #[test]
    fn test_render_contains_escapes_wildcards() {
        let predicate = compiled(&[("note", FilterCriterion::contains("50%_off"))]);
        let rendered = render_predicate(&predicate);
        assert_eq!(rendered.sql, "\"note\" LIKE ? ESCAPE '\\'");
        assert_eq!(rendered.binds, vec![FieldValue::text("%50\\%\\_off%")]);
    }

    #[test]
    fn test_render_order() {
        let catalog = FieldCatalog::builtin();
        assert_eq!(render_order(None, &catalog).unwrap(), "id ASC");
        assert_eq!(
            render_order(Some(&SortOrder::descending("year")), &catalog).unwrap(),
            "\"year\" DESC, id ASC"
        );
        assert!(render_order(Some(&SortOrder::ascending("colour")), &catalog).is_err());
        assert!(render_order(Some(&SortOrder::ascending("reverseimg")), &catalog).is_err());
    }

    async fn sample_store(dir: &tempfile::TempDir) -> Store {
        let mut store = Store::create(dir.path().join("coins.db")).await.unwrap();
        for (country, year) in [("X", 1990), ("Y", 1990), ("X", 1985), ("Z", 2001)] {
            store
                .insert(
                    NewItem::new(ItemStatus::Owned)
                        .with("country", FieldValue::text(country))
                        .with("year", FieldValue::Integer(year)),
                )
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_filter_by_country() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sample_store(&dir).await;
        let engine = FilterEngine::default();

        let mut criteria = FilterCriteria::new();
        criteria.insert("country".into(), FilterCriterion::one_of([FieldValue::text("X")]));
        criteria.insert("year".into(), FilterCriterion::one_of([FieldValue::Integer(1990)]));

        let items = engine
            .view(&mut store, &criteria, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].field("country"), Some(&FieldValue::text("X")));
        assert_eq!(items[0].field("year"), Some(&FieldValue::Integer(1990)));
    }

    #[tokio::test]
    async fn test_sql_and_memory_agree() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sample_store(&dir).await;
        let engine = FilterEngine::default();
        let cancel = CancellationToken::new();

        let all = engine
            .apply(&mut store, &Predicate::match_all(), None, &cancel)
            .await
            .unwrap();
        let predicate = compiled(&[
            ("country", FilterCriterion::contains("x")),
            ("year", FilterCriterion::NonBlank),
        ]);
        let filtered = engine.apply(&mut store, &predicate, None, &cancel).await.unwrap();

        let expected: Vec<&Item> = all.iter().filter(|i| predicate.matches(i)).collect();
        assert_eq!(filtered.iter().collect::<Vec<_>>(), expected);
        assert_eq!(filtered.len(), 2);
    }

    #[tokio::test]
    async fn test_stable_order_keeps_store_order_on_ties() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sample_store(&dir).await;
        let engine = FilterEngine::default();
        let cancel = CancellationToken::new();

        let items = engine
            .apply(
                &mut store,
                &Predicate::match_all(),
                Some(&SortOrder::descending("year")),
                &cancel,
            )
            .await
            .unwrap();
        let order: Vec<(String, String)> = items
            .iter()
            .map(|i| (i.field("country").unwrap().to_string(), i.field("year").unwrap().to_string()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("Z".to_string(), "2001".to_string()),
                ("X".to_string(), "1990".to_string()),
                ("Y".to_string(), "1990".to_string()),
                ("X".to_string(), "1985".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_cancelled_apply() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sample_store(&dir).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = FilterEngine::default()
            .apply(&mut store, &Predicate::match_all(), None, &cancel)
            .await;
        assert!(matches!(result, Err(DbError::Cancelled)));
    }

    #[tokio::test]
    async fn test_too_complex_filter_shows_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = sample_store(&dir).await;
        let engine = FilterEngine::new(FilterLimits { max_combinations: 1 });

        let mut criteria = FilterCriteria::new();
        criteria.insert(
            "country".into(),
            FilterCriterion::one_of([FieldValue::text("X"), FieldValue::text("Y")]),
        );
        let compiled = engine.compile(&criteria, store.catalog()).unwrap();
        assert!(compiled.too_complex);

        let items = engine
            .view(&mut store, &criteria, None, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(items.len(), 4);
    }
}
