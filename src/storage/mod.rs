// src/storage/mod.rs

//! Snapshot persistence for offline fallback.
//!
//! ## Directory Structure
//!
//! ```text
//! {snapshot_dir}/
//! ├── elrs/
//! │   ├── A.json        # one initial
//! │   ├── B.json
//! │   └── all.json      # merged category
//! ├── line-names/
//! │   └── all.json
//! └── mileage-files/
//!     └── A/
//!         └── AAV.json  # one ELR
//! ```

pub mod local;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::{CategoryTable, Coverage, Initial, MileageFile, NormalizedRecord, Scope};

pub use local::LocalSnapshotStore;

/// Identifies one stored snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub category: String,
    /// `None` for the merged "all" snapshot
    pub initial: Option<Initial>,
}

impl SnapshotKey {
    pub fn new(category: impl Into<String>, scope: Scope) -> Self {
        Self {
            category: category.into(),
            initial: match scope {
                Scope::Initial(initial) => Some(initial),
                Scope::All => None,
            },
        }
    }

    pub fn initial(category: impl Into<String>, initial: Initial) -> Self {
        Self::new(category, Scope::Initial(initial))
    }

    pub fn all(category: impl Into<String>) -> Self {
        Self::new(category, Scope::All)
    }

    /// Path relative to the snapshot root.
    pub fn relative_path(&self) -> String {
        match self.initial {
            Some(initial) => format!("{}/{}.json", self.category, initial),
            None => format!("{}/all.json", self.category),
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.initial {
            Some(initial) => write!(f, "{}/{}", self.category, initial),
            None => write!(f, "{}/all", self.category),
        }
    }
}

/// Directory holding mileage files, grouped by the ELR's first letter.
pub const MILEAGE_DIR: &str = "mileage-files";

/// Path of an ELR's mileage file relative to the snapshot root.
pub fn mileage_path(elr: &str) -> String {
    let elr = elr.trim().to_ascii_uppercase();
    let group: String = elr.chars().take(1).collect();
    format!("{MILEAGE_DIR}/{group}/{elr}.json")
}

/// A persisted category table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub key: SnapshotKey,
    pub saved_at: DateTime<Utc>,
    /// SHA-256 of the serialized records
    pub fingerprint: String,
    pub table: CategoryTable,
    #[serde(default)]
    pub coverage: Coverage,
}

impl Snapshot {
    pub fn new(key: SnapshotKey, table: CategoryTable, coverage: Coverage) -> Result<Self> {
        Ok(Self {
            key,
            saved_at: Utc::now(),
            fingerprint: fingerprint(&table.records)?,
            table,
            coverage,
        })
    }
}

/// Content fingerprint of a record set.
pub fn fingerprint(records: &[NormalizedRecord]) -> Result<String> {
    let bytes = serde_json::to_vec(records)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Trait for snapshot storage backends.
pub trait SnapshotStore {
    /// Load a snapshot, `None` if it was never saved.
    fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>>;

    /// Save a snapshot, replacing any previous one wholesale.
    fn save(&self, snapshot: &Snapshot) -> Result<()>;

    /// Whether a snapshot is missing, unreadable, or too old.
    fn is_stale(&self, key: &SnapshotKey) -> bool;

    /// Load the saved mileage file of an ELR.
    fn load_mileage_file(&self, elr: &str) -> Result<Option<MileageFile>>;

    /// Save a mileage file, replacing any previous one.
    fn save_mileage_file(&self, file: &MileageFile) -> Result<()>;
}
