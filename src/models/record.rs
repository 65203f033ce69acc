// src/models/record.rs

//! Normalized records and their side channels.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A typed cell value.
///
/// Serialized externally tagged (`{"float": 11.5}`, `{"date": "2021-01-09"}`,
/// `"null"`) so that a snapshot restores the same variant it stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Text(String),
    Float(f64),
    Date(NaiveDate),
    #[default]
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Plain JSON rendering used by the response triad.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::Null => serde_json::Value::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Float(v) => write!(f, "{v}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Null => Ok(()),
        }
    }
}

/// Where a note was found in the source cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteMarker {
    Superscript,
    Asterisk,
    Dagger,
    DoubleDagger,
    Section,
    Bracket,
    Cross,
    Approximate,
}

/// Free-text footnote content detached from a record field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteAnnotation {
    /// Annotated column; `None` for a whole-record note
    pub column: Option<String>,
    pub marker: NoteMarker,
    pub text: String,
}

impl NoteAnnotation {
    pub fn new(column: impl Into<String>, marker: NoteMarker, text: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            marker,
            text: text.into(),
        }
    }
}

/// One logical entity: canonical column name to typed value.
///
/// Notes and links ride along with the record but take no part in equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub values: BTreeMap<String, Value>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<NoteAnnotation>,

    /// Column to hyperlink target of its cell, e.g. a mileage file
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
}

impl NormalizedRecord {
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    /// Text of a column, if it holds text.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_text)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

impl PartialEq for NormalizedRecord {
    fn eq(&self, other: &Self) -> bool {
        self.values == other.values
    }
}

/// What could not be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissKind {
    Glyph,
    Date,
    Number,
    Column,
}

impl fmt::Display for MissKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Glyph => "glyph",
            Self::Date => "date",
            Self::Number => "number",
            Self::Column => "column",
        };
        f.write_str(name)
    }
}

/// A non-fatal failure to interpret part of a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodeMiss {
    pub kind: MissKind,
    pub column: String,
    /// Source row in the grid
    pub row: usize,
    pub text: String,
}

impl fmt::Display for DecodeMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} miss in '{}' row {}: {:?}",
            self.kind, self.column, self.row, self.text
        )
    }
}
