// src/models/mod.rs

//! Domain models for the railcodes library.
//!
//! This module contains all data structures used throughout the library,
//! organized by their primary purpose.

pub mod category;
mod config;
pub mod grid;
pub mod mileage;
pub mod record;
pub mod table;

// Re-export all public types
pub use category::{CategorySpec, ColumnSpec, ColumnType, Initial, Layout, Scope, Section};
pub use config::{Config, HttpConfig, SourceConfig, StorageConfig};
pub use grid::{Cell, LINE_BREAK, RawTableGrid};
pub use mileage::{
    ConnectionMileages, Measure, MileChain, MileageEntry, MileageFile, NodeConnection,
    ViaConnection,
};
pub use record::{DecodeMiss, MissKind, NormalizedRecord, NoteAnnotation, NoteMarker, Value};
pub use table::{CategoryTable, Coverage, InitialFailure, MergedCategoryTable, SourceNote};
