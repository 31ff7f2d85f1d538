//! # Filter Compilation
//!
//! Turns per-column filter criteria into a [`Predicate`].
//!
//! ## Semantics
//! ```text
//! criteria = { country: OneOf[X, Y, (Blanks)], year: OneOf[1990] , mint: (All) }
//!
//!                 AND across fields
//!   ┌──────────────────────┴──────────────────────┐
//!   country ∈ {X, Y} OR country blank          year = 1990
//!        (OR within a field's value set)
//!
//!   mint: (All) → omitted from the predicate
//! ```
//!
//! ## Complexity Cap
//! The number of value combinations a filter can produce is the product of
//! the value-set sizes of its multi-value criteria. When that exceeds
//! [`FilterLimits::max_combinations`] the filter is dropped and the result
//! is a match-all predicate with [`CompiledFilter::too_complex`] set. This
//! is a degradation, not an error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fields::{FieldCatalog, FieldType};
use crate::types::{FieldValue, Item};
use crate::DEFAULT_MAX_FILTER_COMBINATIONS;

// =============================================================================
// Criteria
// =============================================================================

/// What the user picked for one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterCriterion {
    /// "(All)": the column is unconstrained.
    MatchAll,
    /// Any of the listed values, plus blanks when `include_blank` is set.
    OneOf {
        values: Vec<FieldValue>,
        include_blank: bool,
    },
    /// "(Blanks)" only.
    Blank,
    /// Anything but blanks.
    NonBlank,
    /// Case-insensitive substring match on a text column.
    Contains { text: String },
}

impl FilterCriterion {
    /// Shorthand for `OneOf` without blanks.
    pub fn one_of(values: impl IntoIterator<Item = FieldValue>) -> Self {
        FilterCriterion::OneOf {
            values: values.into_iter().collect(),
            include_blank: false,
        }
    }

    pub fn contains(text: impl Into<String>) -> Self {
        FilterCriterion::Contains { text: text.into() }
    }
}

/// Criteria keyed by field name.
pub type FilterCriteria = BTreeMap<String, FilterCriterion>;

/// Tunables for filter compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterLimits {
    /// Largest accepted number of value combinations.
    pub max_combinations: u64,
}

impl Default for FilterLimits {
    fn default() -> Self {
        FilterLimits {
            max_combinations: DEFAULT_MAX_FILTER_COMBINATIONS,
        }
    }
}

// =============================================================================
// Predicate
// =============================================================================

/// Test applied to one column.
#[derive(Debug, Clone, PartialEq)]
pub enum ClauseTest {
    OneOf {
        values: Vec<FieldValue>,
        include_blank: bool,
    },
    Blank,
    NonBlank,
    Contains(String),
}

/// One column constraint of a compiled predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub field_type: FieldType,
    pub test: ClauseTest,
}

impl Clause {
    fn matches(&self, item: &Item) -> bool {
        let value = item.value(&self.field);
        let blank = value.as_deref().map_or(true, FieldValue::is_blank);

        match &self.test {
            ClauseTest::Blank => blank,
            ClauseTest::NonBlank => !blank,
            ClauseTest::OneOf {
                values,
                include_blank,
            } => {
                if blank {
                    return *include_blank || values.iter().any(FieldValue::is_blank);
                }
                value.as_deref().map_or(false, |v| values.contains(v))
            }
            ClauseTest::Contains(needle) => value
                .as_deref()
                .and_then(FieldValue::as_text)
                .map_or(false, |text| {
                    text.to_ascii_lowercase()
                        .contains(&needle.to_ascii_lowercase())
                }),
        }
    }
}

/// A conjunction of column clauses. No clauses means match-all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn match_all() -> Self {
        Predicate::default()
    }

    pub fn is_match_all(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Evaluates the predicate against an item in memory.
    pub fn matches(&self, item: &Item) -> bool {
        self.clauses.iter().all(|clause| clause.matches(item))
    }
}

/// Result of [`compile`].
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    pub predicate: Predicate,
    /// The criteria were over the complexity cap and have been ignored.
    pub too_complex: bool,
}

// =============================================================================
// Compilation
// =============================================================================

/// Compiles criteria against a field catalog.
///
/// Unknown fields and values of the wrong type are errors. Exceeding the
/// complexity cap is not: see the module docs.
///
/// ## Example
/// ```rust
/// use numis_core::{compile, FieldCatalog, FieldValue, FilterCriteria, FilterCriterion, FilterLimits};
///
/// let mut criteria = FilterCriteria::new();
/// criteria.insert("country".into(), FilterCriterion::one_of([FieldValue::text("X")]));
/// criteria.insert("mint".into(), FilterCriterion::MatchAll);
///
/// let compiled = compile(&criteria, &FieldCatalog::builtin(), &FilterLimits::default()).unwrap();
/// assert!(!compiled.too_complex);
/// assert_eq!(compiled.predicate.clauses().len(), 1);
/// ```
pub fn compile(
    criteria: &FilterCriteria,
    catalog: &FieldCatalog,
    limits: &FilterLimits,
) -> CoreResult<CompiledFilter> {
    let mut clauses = Vec::new();
    let mut combinations: u64 = 1;

    for (name, criterion) in criteria {
        let field = catalog.require(name)?;
        if !field.field_type.is_filterable() {
            return Err(CoreError::NotFilterable(name.clone()));
        }

        let test = match criterion {
            FilterCriterion::MatchAll => continue,
            FilterCriterion::Blank => ClauseTest::Blank,
            FilterCriterion::NonBlank => ClauseTest::NonBlank,
            FilterCriterion::Contains { text } => {
                if !field.field_type.is_textual() {
                    return Err(CoreError::TypeMismatch {
                        field: name.clone(),
                        expected: "text field".to_string(),
                        actual: field.field_type.to_string(),
                    });
                }
                if text.is_empty() {
                    continue;
                }
                ClauseTest::Contains(text.clone())
            }
            FilterCriterion::OneOf {
                values,
                include_blank,
            } => {
                if let Some(bad) = values.iter().find(|v| !field.field_type.accepts(v)) {
                    return Err(CoreError::TypeMismatch {
                        field: name.clone(),
                        expected: field.field_type.to_string(),
                        actual: bad.kind().to_string(),
                    });
                }
                let size = values.len() as u64 + u64::from(*include_blank);
                if size > 1 {
                    combinations = combinations.saturating_mul(size);
                }
                ClauseTest::OneOf {
                    values: values.clone(),
                    include_blank: *include_blank,
                }
            }
        };

        clauses.push(Clause {
            field: name.clone(),
            field_type: field.field_type,
            test,
        });
    }

    if combinations > limits.max_combinations {
        return Ok(CompiledFilter {
            predicate: Predicate::match_all(),
            too_complex: true,
        });
    }

    Ok(CompiledFilter {
        predicate: Predicate { clauses },
        too_complex: false,
    })
}

// =============================================================================
// Ordering
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Sort column of a view. Ties keep store order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOrder {
    pub field: String,
    pub direction: SortDirection,
}

impl SortOrder {
    pub fn ascending(field: impl Into<String>) -> Self {
        SortOrder {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        SortOrder {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
