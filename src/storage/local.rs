// src/storage/local.rs

//! Local filesystem snapshot store.
//!
//! Writes go to a temporary file first and are renamed into place, so a
//! reader never sees a half-written snapshot.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{AppError, Result};
use crate::models::{MileageFile, StorageConfig};
use crate::storage::{Snapshot, SnapshotKey, SnapshotStore, mileage_path};

/// Snapshot store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    root_dir: PathBuf,
    max_age: Duration,
}

impl LocalSnapshotStore {
    pub fn new(root_dir: impl Into<PathBuf>, max_age_days: u32) -> Self {
        Self {
            root_dir: root_dir.into(),
            max_age: Duration::days(i64::from(max_age_days)),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.snapshot_dir, config.max_age_days)
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    fn path(&self, key: &SnapshotKey) -> PathBuf {
        self.root_dir.join(key.relative_path())
    }

    /// Write bytes atomically (write to temp, then rename).
    fn write_bytes(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, path)?;
        Ok(())
    }

    fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(path, &bytes)
    }

    /// Read JSON, `None` if the file doesn't exist.
    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Keys of every snapshot saved for a category.
    pub fn keys(&self, category: &str) -> Result<Vec<SnapshotKey>> {
        let dir = self.root_dir.join(category);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Io(e)),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if stem == "all" {
                keys.push(SnapshotKey::all(category));
            } else if let Ok(initial) = stem.parse() {
                keys.push(SnapshotKey::initial(category, initial));
            }
        }
        keys.sort_by_key(|k| (k.initial.is_none(), k.initial));
        Ok(keys)
    }
}

impl SnapshotStore for LocalSnapshotStore {
    fn load(&self, key: &SnapshotKey) -> Result<Option<Snapshot>> {
        let snapshot = self.read_json(&self.path(key))?;
        if snapshot.is_none() {
            log::debug!("No snapshot for {}", key);
        }
        Ok(snapshot)
    }

    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let path = self.path(&snapshot.key);
        self.write_json(&path, snapshot)?;
        log::info!(
            "Snapshot {}: {} records written to {}",
            snapshot.key,
            snapshot.table.len(),
            path.display()
        );
        Ok(())
    }

    fn is_stale(&self, key: &SnapshotKey) -> bool {
        match self.load(key) {
            Ok(Some(snapshot)) => Utc::now() - snapshot.saved_at > self.max_age,
            Ok(None) => true,
            Err(e) => {
                log::warn!("Unreadable snapshot {}: {}", key, e);
                true
            }
        }
    }

    fn load_mileage_file(&self, elr: &str) -> Result<Option<MileageFile>> {
        self.read_json(&self.root_dir.join(mileage_path(elr)))
    }

    fn save_mileage_file(&self, file: &MileageFile) -> Result<()> {
        let path = self.root_dir.join(mileage_path(&file.elr));
        self.write_json(&path, file)?;
        log::info!("Mileage file {} written to {}", file.elr, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryTable, Coverage, Initial, NormalizedRecord, Value};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_table() -> CategoryTable {
        let mut table = CategoryTable::empty(
            "stations",
            "Railway stations",
            vec![
                "Station".into(),
                "Longitude".into(),
                "Opened".into(),
                "Rebuilt".into(),
            ],
        );
        table.initial = Some(Initial::new('p').unwrap());
        table.last_updated = NaiveDate::from_ymd_opt(2022, 11, 3);
        let mut record = NormalizedRecord::default();
        record.set("Station", Value::Text("Paddington".into()));
        record.set("Longitude", Value::Float(-0.175_853_1));
        record.set("Opened", Value::Null);
        record.set("Rebuilt", Value::Date(date(2014, 11, 30)));
        table.records.push(record);
        table
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn key() -> SnapshotKey {
        SnapshotKey::initial("stations", Initial::new('p').unwrap())
    }

    #[test]
    fn save_then_load_restores_typed_values() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);

        let snapshot = Snapshot::new(key(), sample_table(), Coverage::default()).unwrap();
        store.save(&snapshot).unwrap();

        let loaded = store.load(&key()).unwrap().unwrap();
        assert_eq!(loaded, snapshot);
        let record = &loaded.table.records[0];
        assert_eq!(record.get("Longitude"), Some(&Value::Float(-0.175_853_1)));
        assert_eq!(record.get("Opened"), Some(&Value::Null));
        assert_eq!(record.get("Rebuilt"), Some(&Value::Date(date(2014, 11, 30))));
        assert!(tmp.path().join("stations/P.json").exists());
        assert!(!tmp.path().join("stations/P.tmp").exists());
    }

    #[test]
    fn missing_snapshot_is_none_and_stale() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);
        assert!(store.load(&key()).unwrap().is_none());
        assert!(store.is_stale(&key()));
    }

    #[test]
    fn staleness_follows_max_age() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);

        let mut snapshot = Snapshot::new(key(), sample_table(), Coverage::default()).unwrap();
        store.save(&snapshot).unwrap();
        assert!(!store.is_stale(&key()));

        snapshot.saved_at = Utc::now() - Duration::days(31);
        store.save(&snapshot).unwrap();
        assert!(store.is_stale(&key()));
    }

    #[test]
    fn unreadable_snapshot_is_stale() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);
        fs::create_dir_all(tmp.path().join("stations")).unwrap();
        fs::write(tmp.path().join("stations/P.json"), b"{ not json").unwrap();

        assert!(store.load(&key()).is_err());
        assert!(store.is_stale(&key()));
    }

    #[test]
    fn save_replaces_wholesale() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);

        store
            .save(&Snapshot::new(key(), sample_table(), Coverage::default()).unwrap())
            .unwrap();
        let mut smaller = sample_table();
        smaller.records.clear();
        store
            .save(&Snapshot::new(key(), smaller, Coverage::default()).unwrap())
            .unwrap();

        assert!(store.load(&key()).unwrap().unwrap().table.is_empty());
    }

    #[test]
    fn lists_saved_keys() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);
        store
            .save(&Snapshot::new(key(), sample_table(), Coverage::default()).unwrap())
            .unwrap();
        let all = SnapshotKey::all("stations");
        store
            .save(&Snapshot::new(all.clone(), sample_table(), Coverage::default()).unwrap())
            .unwrap();

        assert_eq!(store.keys("stations").unwrap(), vec![key(), all]);
        assert!(store.keys("elrs").unwrap().is_empty());
    }

    #[test]
    fn mileage_file_round_trips() {
        use crate::models::{Measure, MileChain, MileageEntry};

        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);
        assert!(store.load_mileage_file("AAV").unwrap().is_none());

        let file = MileageFile {
            elr: "AAV".into(),
            line: "Ashchurch and Evesham".into(),
            sub_line: None,
            measures: vec![Measure {
                name: Some("Current measure".into()),
                entries: vec![MileageEntry {
                    mile_chain: Some(MileChain::new(11, 42)),
                    mileage_note: None,
                    node: "Evesham".into(),
                    connections: Vec::new(),
                }],
            }],
            notes: None,
            source: "http://www.railwaycodes.org.uk/elrs/_mileages/a/aav.shtm".into(),
            last_updated: Some(date(2020, 5, 2)),
        };
        store.save_mileage_file(&file).unwrap();

        assert!(tmp.path().join("mileage-files/A/AAV.json").exists());
        assert_eq!(store.load_mileage_file("aav").unwrap(), Some(file));
    }
}
