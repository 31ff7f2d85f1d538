//! # Reference Catalog
//!
//! The reference is the set of pick-lists offered when editing a coin:
//! countries, units, mints, grades and so on. It lives either in its own
//! file or embedded in a collection, never both (see `numis-db`).
//!
//! The serialized form is JSON. Embedded copies are kept as the exact bytes
//! that were attached, so detaching gives back the original file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Fields backed by a reference section.
pub const REFERENCE_SECTIONS: [&str; 10] = [
    "country", "unit", "period", "mint", "series", "metal", "grade", "quality", "rarity", "type",
];

/// One pick-list value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub id: i64,
    pub value: String,
    /// Encoded icon image, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Vec<u8>>,
    pub sort_key: i64,
}

/// Pick-lists grouped by section name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub sections: BTreeMap<String, Vec<ReferenceEntry>>,
}

impl Reference {
    /// Empty reference with one section per reference-backed field.
    pub fn scaffold() -> Self {
        Reference {
            sections: REFERENCE_SECTIONS
                .iter()
                .map(|name| (name.to_string(), Vec::new()))
                .collect(),
        }
    }

    /// Parses serialized reference bytes.
    pub fn from_bytes(bytes: &[u8]) -> CoreResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| CoreError::InvalidReference(e.to_string()))
    }

    pub fn to_bytes(&self) -> CoreResult<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|e| CoreError::InvalidReference(e.to_string()))
    }

    /// Entries of a section ordered by sort key.
    pub fn entries(&self, section: &str) -> Vec<&ReferenceEntry> {
        let mut entries: Vec<&ReferenceEntry> = self
            .sections
            .get(section)
            .map(|s| s.iter().collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.sort_key);
        entries
    }

    /// Appends a value to a section, creating the section if needed.
    ///
    /// Returns the new entry's id. Adding a value that already exists
    /// returns the existing id.
    pub fn add(&mut self, section: &str, value: impl Into<String>) -> i64 {
        let value = value.into();
        let entries = self.sections.entry(section.to_string()).or_default();
        if let Some(existing) = entries.iter().find(|e| e.value == value) {
            return existing.id;
        }
        let id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        entries.push(ReferenceEntry {
            id,
            value,
            icon: None,
            sort_key: entries.len() as i64,
        });
        id
    }

    /// True if no section holds any entry.
    pub fn is_empty(&self) -> bool {
        self.sections.values().all(Vec::is_empty)
    }
}
