// src/services/repository.rs

//! Live-or-snapshot orchestration.
//!
//! A request probes connectivity once, then either collects live through the
//! resolver or loads the last saved snapshot. The update operation is the
//! only path that writes snapshots on its own. Mileage files follow the same
//! live-then-snapshot order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::{AppError, Result};
use crate::models::{
    CategorySpec, CategoryTable, ConnectionMileages, Coverage, Initial, Layout,
    MergedCategoryTable, MileageFile, Scope,
};
use crate::services::connectivity::ConnectivityGate;
use crate::services::mileage;
use crate::services::resolver::{CategoryResolver, assemble};
use crate::storage::{Snapshot, SnapshotKey, SnapshotStore};

/// Where a response's table came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Live,
    Snapshot,
}

/// A best-effort table plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryResponse {
    pub scope: Scope,
    pub table: CategoryTable,
    pub provenance: Provenance,
    pub coverage: Coverage,
    /// Save time of the snapshot served, if any
    pub saved_at: Option<DateTime<Utc>>,
}

impl CategoryResponse {
    fn live(scope: Scope, merged: MergedCategoryTable) -> Self {
        Self {
            scope,
            table: merged.table,
            provenance: Provenance::Live,
            coverage: merged.coverage,
            saved_at: None,
        }
    }

    fn from_snapshot(scope: Scope, snapshot: Snapshot) -> Self {
        Self {
            scope,
            table: snapshot.table,
            provenance: Provenance::Snapshot,
            coverage: snapshot.coverage,
            saved_at: Some(snapshot.saved_at),
        }
    }

    pub fn is_live(&self) -> bool {
        self.provenance == Provenance::Live
    }

    /// The `{data, notes, date}` object every category request returns.
    ///
    /// The data key is the initial for a single-initial request and the
    /// category's data key otherwise.
    pub fn to_triad(&self, spec: &CategorySpec) -> Json {
        let data_key = match self.scope {
            Scope::Initial(initial) => initial.to_string(),
            Scope::All => spec.data_key.clone(),
        };

        let records = self
            .table
            .records
            .iter()
            .map(|record| {
                let object: Map<String, Json> = self
                    .table
                    .columns
                    .iter()
                    .map(|column| {
                        let value = record.get(column).map(|v| v.to_json()).unwrap_or(Json::Null);
                        (column.clone(), value)
                    })
                    .collect();
                Json::Object(object)
            })
            .collect();

        let mut triad = Map::new();
        triad.insert(data_key, Json::Array(records));
        triad.insert(
            spec.notes_key.clone(),
            self.table.notes_text().map_or(Json::Null, Json::String),
        );
        triad.insert(
            spec.date_key.clone(),
            self.table
                .last_updated
                .map_or(Json::Null, |d| Json::String(d.format("%Y-%m-%d").to_string())),
        );
        Json::Object(triad)
    }
}

/// A mileage file plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct MileageResponse {
    pub file: MileageFile,
    pub provenance: Provenance,
}

impl MileageResponse {
    pub fn is_live(&self) -> bool {
        self.provenance == Provenance::Live
    }
}

/// Outcome of updating one category's backup data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum UpdateStatus {
    /// Snapshot was fresh and the update was not forced
    Skipped,
    Updated { changed: bool },
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub category: String,
    #[serde(flatten)]
    pub status: UpdateStatus,
    pub records: usize,
    pub coverage: Coverage,
    /// Initials whose live page failed and whose previous snapshot was reused
    pub reused: Vec<Initial>,
}

impl UpdateReport {
    fn skipped(category: &str) -> Self {
        Self {
            category: category.to_string(),
            status: UpdateStatus::Skipped,
            records: 0,
            coverage: Coverage::default(),
            reused: Vec::new(),
        }
    }

    fn failed(category: &str, reason: String) -> Self {
        Self {
            status: UpdateStatus::Failed { reason },
            ..Self::skipped(category)
        }
    }
}

/// Request surface over the resolver, the gate, and the snapshot store.
pub struct CodeRepository<'a> {
    resolver: CategoryResolver<'a>,
    gate: &'a dyn ConnectivityGate,
    store: &'a dyn SnapshotStore,
    categories: &'a [CategorySpec],
}

impl<'a> CodeRepository<'a> {
    pub fn new(
        resolver: CategoryResolver<'a>,
        gate: &'a dyn ConnectivityGate,
        store: &'a dyn SnapshotStore,
        categories: &'a [CategorySpec],
    ) -> Self {
        Self {
            resolver,
            gate,
            store,
            categories,
        }
    }

    pub fn category(&self, id: &str) -> Result<&'a CategorySpec> {
        CategorySpec::find(self.categories, id)
    }

    pub fn resolver(&self) -> &CategoryResolver<'a> {
        &self.resolver
    }

    /// Table of one initial, live if reachable, otherwise from its snapshot.
    pub fn collect_by_initial(&self, category: &str, initial: Initial) -> Result<CategoryResponse> {
        self.request(self.category(category)?, Scope::Initial(initial))
    }

    /// Merged table of a whole category, live if reachable, otherwise from its snapshot.
    pub fn fetch_all(&self, category: &str) -> Result<CategoryResponse> {
        self.request(self.category(category)?, Scope::All)
    }

    /// Serve a request for `scope` of `spec`.
    pub fn request(&self, spec: &CategorySpec, scope: Scope) -> Result<CategoryResponse> {
        spec.check_scope(scope)?;

        if !self.gate.probe() {
            return self.fallback(spec, scope, "network unreachable".to_string());
        }

        match self.resolver.collect(spec, scope) {
            Ok(merged) if merged.coverage.expected > 0 && merged.succeeded_count() == 0 => {
                self.fallback(spec, scope, "every initial failed".to_string())
            }
            Ok(merged) => Ok(CategoryResponse::live(scope, merged)),
            Err(e) => {
                log::warn!("Live collection of {} ({}) failed: {}", spec.id, scope, e);
                self.fallback(spec, scope, e.to_string())
            }
        }
    }

    fn fallback(&self, spec: &CategorySpec, scope: Scope, reason: String) -> Result<CategoryResponse> {
        let key = SnapshotKey::new(&spec.id, scope);
        log::info!("Loading snapshot {} ({})", key, reason);
        match self.store.load(&key) {
            Ok(Some(snapshot)) => Ok(CategoryResponse::from_snapshot(scope, snapshot)),
            Ok(None) => Err(AppError::unavailable(
                &spec.id,
                format!("{reason}; no snapshot {key}"),
            )),
            Err(e) => Err(AppError::unavailable(
                &spec.id,
                format!("{reason}; snapshot {key} unreadable: {e}"),
            )),
        }
    }

    /// Mileage file of an ELR, live if reachable, otherwise as last saved.
    ///
    /// An ELR the source has no mileage file for is [`AppError::NotFound`]
    /// and never falls back.
    pub fn mileage_file(&self, elr: &str) -> Result<MileageResponse> {
        self.mileage_file_with(elr, self.gate.probe())
    }

    fn mileage_file_with(&self, elr: &str, reachable: bool) -> Result<MileageResponse> {
        let reason = if reachable {
            match self.resolver.collect_mileage_file(elr) {
                Ok(file) => {
                    return Ok(MileageResponse {
                        file,
                        provenance: Provenance::Live,
                    });
                }
                Err(e @ AppError::NotFound { .. }) => return Err(e),
                Err(e) => {
                    log::warn!("Live mileage file {} failed: {}", elr, e);
                    e.to_string()
                }
            }
        } else {
            "network unreachable".to_string()
        };

        match self.store.load_mileage_file(elr) {
            Ok(Some(file)) => Ok(MileageResponse {
                file,
                provenance: Provenance::Snapshot,
            }),
            Ok(None) => Err(AppError::unavailable(
                format!("mileage file {elr}"),
                format!("{reason}; nothing saved"),
            )),
            Err(e) => Err(AppError::unavailable(
                format!("mileage file {elr}"),
                format!("{reason}; saved copy unreadable: {e}"),
            )),
        }
    }

    /// Persist a live mileage file.
    pub fn save_mileage_file(&self, response: &MileageResponse) -> Result<()> {
        if !response.is_live() {
            return Ok(());
        }
        self.store.save_mileage_file(&response.file)
    }

    /// Where two ELRs meet, directly or through one connected ELR.
    ///
    /// Connectivity is checked once for every mileage file the search reads.
    pub fn connection_mileages(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Option<ConnectionMileages>> {
        let reachable = self.gate.probe();
        mileage::connect(start, end, |elr| {
            self.mileage_file_with(elr, reachable).map(|r| r.file)
        })
    }

    /// Snapshot only, never touching the network.
    pub fn load(&self, category: &str, scope: Scope) -> Result<CategoryResponse> {
        let spec = self.category(category)?;
        let key = SnapshotKey::new(&spec.id, scope);
        self.store
            .load(&key)?
            .map(|snapshot| CategoryResponse::from_snapshot(scope, snapshot))
            .ok_or_else(|| AppError::not_found(key.to_string()))
    }

    /// Persist a live response as the snapshot for its scope.
    pub fn save(&self, spec: &CategorySpec, response: &CategoryResponse) -> Result<()> {
        if !response.is_live() {
            return Ok(());
        }
        let key = SnapshotKey::new(&spec.id, response.scope);
        self.store.save(&Snapshot::new(
            key,
            response.table.clone(),
            response.coverage.clone(),
        )?)
    }

    /// Re-collect a category and replace its snapshots.
    ///
    /// Initials whose page fails keep their previous snapshot.
    pub fn update_backup(&self, category: &str, force: bool) -> Result<UpdateReport> {
        let spec = self.category(category)?;
        if !force && !self.store.is_stale(&SnapshotKey::all(&spec.id)) {
            log::info!("{} snapshot is fresh, skipping", spec.id);
            return Ok(UpdateReport::skipped(&spec.id));
        }
        if !self.gate.probe() {
            return Err(AppError::unavailable(&spec.id, "network unreachable"));
        }
        self.refresh(spec)
    }

    /// Update every configured category, probing connectivity once.
    pub fn update_all(&self, force: bool) -> Result<Vec<UpdateReport>> {
        let pending: Vec<&CategorySpec> = self
            .categories
            .iter()
            .filter(|spec| force || self.store.is_stale(&SnapshotKey::all(&spec.id)))
            .collect();

        let mut reports: Vec<UpdateReport> = self
            .categories
            .iter()
            .filter(|spec| !pending.iter().any(|p| p.id == spec.id))
            .map(|spec| UpdateReport::skipped(&spec.id))
            .collect();

        if pending.is_empty() {
            return Ok(reports);
        }
        if !self.gate.probe() {
            return Err(AppError::unavailable("*", "network unreachable"));
        }

        for spec in pending {
            let report = self.refresh(spec).unwrap_or_else(|e| {
                log::error!("Update of {} failed: {}", spec.id, e);
                UpdateReport::failed(&spec.id, e.to_string())
            });
            reports.push(report);
        }
        Ok(reports)
    }

    fn refresh(&self, spec: &CategorySpec) -> Result<UpdateReport> {
        let (merged, reused) = match &spec.layout {
            Layout::Paginated { .. } => self.refresh_initials(spec)?,
            _ => (self.resolver.collect(spec, Scope::All)?, Vec::new()),
        };

        let key = SnapshotKey::all(&spec.id);
        let previous = match self.store.load(&key) {
            Ok(snapshot) => snapshot.map(|s| s.fingerprint),
            Err(e) => {
                log::warn!("Previous snapshot {} unreadable: {}", key, e);
                None
            }
        };

        let records = merged.table.len();
        let snapshot = Snapshot::new(key, merged.table, merged.coverage)?;
        let changed = previous.as_deref() != Some(snapshot.fingerprint.as_str());
        self.store.save(&snapshot)?;

        log::info!(
            "Updated {}: {} records ({})",
            spec.id,
            records,
            if changed { "changed" } else { "unchanged" }
        );
        Ok(UpdateReport {
            category: spec.id.clone(),
            status: UpdateStatus::Updated { changed },
            records,
            coverage: snapshot.coverage,
            reused,
        })
    }

    fn refresh_initials(&self, spec: &CategorySpec) -> Result<(MergedCategoryTable, Vec<Initial>)> {
        let (mut tables, failures) = self.resolver.collect_initials(spec);

        for table in &tables {
            if let Some(initial) = table.initial {
                let key = SnapshotKey::initial(&spec.id, initial);
                self.store
                    .save(&Snapshot::new(key, table.clone(), Coverage::default())?)?;
            }
        }

        let mut reused = Vec::new();
        let mut failed = Vec::new();
        for failure in failures {
            let key = SnapshotKey::initial(&spec.id, failure.initial);
            match self.store.load(&key) {
                Ok(Some(previous)) => {
                    log::info!("Reusing previous snapshot {}", key);
                    reused.push(failure.initial);
                    tables.push(previous.table);
                }
                _ => failed.push(failure),
            }
        }

        if tables.is_empty() {
            return Err(AppError::unavailable(
                &spec.id,
                "no initial could be collected",
            ));
        }
        Ok((assemble(spec, tables, failed, spec.initials().len()), reused))
    }
}
