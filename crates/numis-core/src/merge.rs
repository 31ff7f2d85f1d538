//! # Merge Bookkeeping
//!
//! Counters produced when one collection is merged into another. The merge
//! itself lives in `numis-sync`; this module only knows how to tally.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to one incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    /// Not present locally, added.
    Inserted,
    /// Present locally with different content, overwritten.
    Updated,
    /// Present locally with the same content.
    Unchanged,
}

/// Totals of a merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

impl MergeReport {
    pub fn record(&mut self, outcome: MergeOutcome) {
        match outcome {
            MergeOutcome::Inserted => self.inserted += 1,
            MergeOutcome::Updated => self.updated += 1,
            MergeOutcome::Unchanged => self.unchanged += 1,
        }
    }

    /// Number of incoming items processed.
    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.unchanged
    }

    /// Nothing was inserted or updated.
    pub fn is_identical(&self) -> bool {
        self.inserted == 0 && self.updated == 0
    }
}

impl fmt::Display for MergeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inserted, {} updated, {} unchanged",
            self.inserted, self.updated, self.unchanged
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_totals() {
        let mut report = MergeReport::default();
        report.record(MergeOutcome::Inserted);
        report.record(MergeOutcome::Unchanged);
        report.record(MergeOutcome::Unchanged);

        assert_eq!(report.total(), 3);
        assert!(!report.is_identical());
        assert_eq!(report.to_string(), "1 inserted, 0 updated, 2 unchanged");
    }

    #[test]
    fn test_empty_report_is_identical() {
        assert!(MergeReport::default().is_identical());

        let mut report = MergeReport::default();
        report.record(MergeOutcome::Unchanged);
        assert!(report.is_identical());
        report.record(MergeOutcome::Updated);
        assert!(!report.is_identical());
    }
}
