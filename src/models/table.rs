// src/models/table.rs

//! Category tables: the unit of collection, merging, and snapshotting.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::category::Initial;
use crate::models::record::{NormalizedRecord, Value};

/// Free-text additional notes with their provenance label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceNote {
    /// Initial letter or page the note came from
    pub label: String,
    pub text: String,
}

/// Normalized records of one category page (or of merged pages).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable {
    /// Category identifier
    pub category: String,

    /// Category display name
    pub name: String,

    /// Set for a single-initial table
    #[serde(default)]
    pub initial: Option<Initial>,

    /// Column order shared by every record
    pub columns: Vec<String>,

    pub records: Vec<NormalizedRecord>,

    /// Pages the records were read from
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub last_updated: Option<NaiveDate>,

    #[serde(default)]
    pub notes: Vec<SourceNote>,

    /// Number of decode misses met while normalizing
    #[serde(default)]
    pub decode_misses: usize,
}

impl CategoryTable {
    /// An empty table with a fixed column set.
    pub fn empty(
        category: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            initial: None,
            columns,
            records: Vec::new(),
            sources: Vec::new(),
            last_updated: None,
            notes: Vec::new(),
            decode_misses: 0,
        }
    }

    /// Display title, e.g. "ELRs and mileages beginning with A".
    pub fn title(&self) -> String {
        match self.initial {
            Some(initial) => format!("{} beginning with {}", self.name, initial),
            None => self.name.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// First source page, if any.
    pub fn source_url(&self) -> Option<&str> {
        self.sources.first().map(String::as_str)
    }

    /// Add any missing columns as explicit nulls so every record has the full set.
    pub fn fill_missing_columns(&mut self) {
        for record in &mut self.records {
            for column in &self.columns {
                if !record.values.contains_key(column) {
                    record.set(column.clone(), Value::Null);
                }
            }
        }
    }

    /// Whether every record carries exactly the table's columns.
    pub fn has_uniform_columns(&self) -> bool {
        self.records.iter().all(|record| {
            record.values.len() == self.columns.len()
                && self.columns.iter().all(|c| record.values.contains_key(c))
        })
    }

    /// All additional notes joined as `label: text` lines.
    pub fn notes_text(&self) -> Option<String> {
        if self.notes.is_empty() {
            return None;
        }
        Some(
            self.notes
                .iter()
                .map(|n| format!("{}: {}", n.label, n.text))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// A per-initial failure recorded during an "all" collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialFailure {
    pub initial: Initial,
    pub reason: String,
}

/// Which initials a merged table is made of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Coverage {
    pub succeeded: Vec<Initial>,
    pub failed: Vec<InitialFailure>,
    /// Initials an "all" collection is expected to visit
    pub expected: usize,
}

impl Coverage {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_initials(&self) -> Vec<Initial> {
        self.failed.iter().map(|f| f.initial).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.succeeded.len() >= self.expected
    }
}

/// Concatenation of single-initial tables of one category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedCategoryTable {
    pub table: CategoryTable,
    pub coverage: Coverage,
}

impl MergedCategoryTable {
    pub fn succeeded_count(&self) -> usize {
        self.coverage.succeeded_count()
    }

    pub fn is_partial(&self) -> bool {
        !self.coverage.is_complete()
    }
}
