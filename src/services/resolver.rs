// src/services/resolver.rs

//! Category resolver.
//!
//! Maps a category request (one initial, or all of them) to source pages,
//! runs each page through tokenizer and normalizer, and merges per-initial
//! tables into one. Parse-level problems stay inside this module: malformed
//! tables are skipped, decode misses are counted, and a failing initial in an
//! "all" collection is recorded on the result instead of aborting it.
//!
//! Mileage files are collected here too, one page per ELR.

use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use url::Url;

use crate::error::{AppError, Result};
use crate::models::category::{LINK_COLUMNS, SECTION_COLUMN, Section};
use crate::models::{
    CategorySpec, CategoryTable, Config, ConnectionMileages, Coverage, Initial, InitialFailure,
    Layout, MergedCategoryTable, MileageFile, NormalizedRecord, Scope, SourceNote, Value,
};
use crate::services::mileage::{self, MileageParser};
use crate::services::normalizer::RecordNormalizer;
use crate::services::page::Page;
use crate::services::tokenizer;
use crate::utils::http::Fetch;

/// Resolves category requests against live pages.
pub struct CategoryResolver<'a> {
    fetcher: &'a dyn Fetch,
    normalizer: RecordNormalizer,
    mileage: MileageParser,
    base_url: Url,
    request_delay: Duration,
}

impl<'a> CategoryResolver<'a> {
    /// Create a resolver using the source and HTTP settings of `config`.
    pub fn new(fetcher: &'a dyn Fetch, config: &Config) -> Result<Self> {
        Ok(Self {
            fetcher,
            normalizer: RecordNormalizer::new()?,
            mileage: MileageParser::new()?,
            base_url: Url::parse(&config.source.base_url)?,
            request_delay: Duration::from_millis(config.http.request_delay_ms),
        })
    }

    /// Override the delay between page fetches.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Absolute URL of the page serving `scope`.
    pub fn page_url(&self, spec: &CategorySpec, scope: Scope) -> Result<String> {
        let path = spec.page_path(scope)?;
        Ok(self.base_url.join(&path)?.to_string())
    }

    /// Collect a category for one initial or for all of them.
    ///
    /// A single-initial request fails with the page's error. An "all" request
    /// of a paginated category only fails on a request error; per-initial
    /// failures land in the result's coverage. Any failing page of a
    /// sectioned category fails the whole collection.
    pub fn collect(&self, spec: &CategorySpec, scope: Scope) -> Result<MergedCategoryTable> {
        match (scope, &spec.layout) {
            (Scope::Initial(initial), _) => {
                let table = self.collect_page(spec, scope)?;
                Ok(MergedCategoryTable {
                    table,
                    coverage: Coverage {
                        succeeded: vec![initial],
                        failed: Vec::new(),
                        expected: 1,
                    },
                })
            }
            (Scope::All, Layout::SinglePage { .. }) => Ok(MergedCategoryTable {
                table: self.collect_page(spec, Scope::All)?,
                coverage: Coverage::default(),
            }),
            (Scope::All, Layout::Paginated { .. }) => Ok(self.collect_all(spec)),
            (Scope::All, Layout::Sections { sections }) => self.collect_sections(spec, sections),
            (Scope::All, Layout::LinkIndex { path, link_selector }) => Ok(MergedCategoryTable {
                table: self.collect_links(spec, path, link_selector)?,
                coverage: Coverage::default(),
            }),
        }
    }

    /// Collect each named page of a sectioned category, tagging records with
    /// their section.
    fn collect_sections(
        &self,
        spec: &CategorySpec,
        sections: &[Section],
    ) -> Result<MergedCategoryTable> {
        let mut tables = Vec::with_capacity(sections.len());
        for (i, section) in sections.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                thread::sleep(self.request_delay);
            }
            let url = self.base_url.join(&section.path)?.to_string();
            let html = self.fetcher.fetch(&url)?;
            let mut table = self.parse_page(spec, Scope::All, &url, &html)?;
            for record in &mut table.records {
                record.set(SECTION_COLUMN, Value::Text(section.name.clone()));
            }
            for note in &mut table.notes {
                note.label = section.name.clone();
            }
            log::info!("Collected {} {} ({} records)", spec.id, section.name, table.len());
            tables.push(table);
        }

        let mut merged = assemble(spec, tables, Vec::new(), 0);
        merged.coverage = Coverage::default();
        Ok(merged)
    }

    /// Read a page of links grouped under headings into records.
    fn collect_links(
        &self,
        spec: &CategorySpec,
        path: &str,
        link_selector: &str,
    ) -> Result<CategoryTable> {
        let url = self.base_url.join(path)?.to_string();
        let html = self.fetcher.fetch(&url)?;
        let page = Page::parse(&html, &url)?;

        let mut table = CategoryTable::empty(&spec.id, &spec.name, spec.column_names());
        table.sources.push(url);
        table.last_updated = page.last_updated(self.normalizer.dates());

        let [section, description, target] = LINK_COLUMNS;
        for link in page.headed_links(link_selector)? {
            let mut record = NormalizedRecord::default();
            record.set(section, link.heading.map_or(Value::Null, Value::Text));
            record.set(description, Value::Text(link.text));
            record.set(target, Value::Text(link.url.clone()));
            record.links.insert(description.to_string(), link.url);
            table.records.push(record);
        }
        Ok(table)
    }

    /// Collect every initial page in order, skipping failures.
    fn collect_all(&self, spec: &CategorySpec) -> MergedCategoryTable {
        let (tables, failed) = self.collect_initials(spec);
        let merged = assemble(spec, tables, failed, spec.initials().len());

        if merged.is_partial() {
            log::warn!(
                "{}: collected {}/{} initials (failed: {:?})",
                spec.id,
                merged.succeeded_count(),
                merged.coverage.expected,
                merged.coverage.failed_initials()
            );
        }
        merged
    }

    /// Single-initial tables of a paginated category, with the initials that failed.
    pub fn collect_initials(
        &self,
        spec: &CategorySpec,
    ) -> (Vec<CategoryTable>, Vec<InitialFailure>) {
        let initials = spec.initials();
        let mut tables = Vec::with_capacity(initials.len());
        let mut failed = Vec::new();

        for (i, initial) in initials.iter().enumerate() {
            if i > 0 && !self.request_delay.is_zero() {
                thread::sleep(self.request_delay);
            }
            match self.collect_page(spec, Scope::Initial(*initial)) {
                Ok(table) => {
                    log::info!("Collected {} ({} records)", table.title(), table.len());
                    tables.push(table);
                }
                Err(e) => {
                    log::warn!("Skipping {} initial {}: {}", spec.id, initial, e);
                    failed.push(InitialFailure {
                        initial: *initial,
                        reason: e.to_string(),
                    });
                }
            }
        }
        (tables, failed)
    }

    /// Fetch and parse the page serving `scope`.
    pub fn collect_page(&self, spec: &CategorySpec, scope: Scope) -> Result<CategoryTable> {
        let url = self.page_url(spec, scope)?;
        let html = self.fetcher.fetch(&url)?;
        self.parse_page(spec, scope, &url, &html)
    }

    /// Turn a fetched page into a category table.
    pub fn parse_page(
        &self,
        spec: &CategorySpec,
        scope: Scope,
        url: &str,
        html: &str,
    ) -> Result<CategoryTable> {
        let page = Page::parse(html, url)?;
        let mut table = CategoryTable::empty(&spec.id, &spec.name, spec.column_names());
        if let Scope::Initial(initial) = scope {
            table.initial = Some(initial);
        }
        table.sources.push(url.to_string());
        table.last_updated = page.last_updated(self.normalizer.dates());

        if let Some(selector) = &spec.notes_selector {
            let label = scope_label(spec, scope);
            table.notes = page
                .notes(selector)?
                .into_iter()
                .map(|text| SourceNote {
                    label: label.clone(),
                    text,
                })
                .collect();
        }

        let elements = page.tables(&spec.table_selector)?;
        if elements.is_empty() {
            log::info!("No data table on {}", url);
            return Ok(table);
        }

        let mut malformed = 0;
        for element in &elements {
            let grid = match tokenizer::tokenize(*element) {
                Ok(grid) => grid,
                Err(e) => {
                    log::warn!("Skipping table on {}: {}", url, e);
                    malformed += 1;
                    continue;
                }
            };
            let normalized = self.normalizer.normalize(&grid, &spec.columns);
            table.decode_misses += normalized.misses.len();
            for mut record in normalized.records {
                for link in record.links.values_mut() {
                    *link = page.resolve(link);
                }
                table.records.push(record);
            }
        }

        if malformed == elements.len() {
            return Err(AppError::malformed(format!(
                "all {} tables on {} are malformed",
                malformed, url
            )));
        }

        Ok(table)
    }

    /// Absolute URL of the mileage file of `elr`.
    pub fn mileage_url(&self, elr: &str) -> Result<String> {
        let elr = elr.trim().to_ascii_lowercase();
        if elr.is_empty() || !elr.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AppError::validation(format!("'{elr}' is not an ELR")));
        }
        let path = format!("elrs/_mileages/{}/{elr}.shtm", &elr[..1]);
        Ok(self.base_url.join(&path)?.to_string())
    }

    /// Fetch and parse the mileage file of `elr`.
    pub fn collect_mileage_file(&self, elr: &str) -> Result<MileageFile> {
        let url = self.mileage_url(elr)?;
        self.collect_mileage_file_at(elr, &url)
    }

    /// Fetch and parse a mileage file from a known URL, e.g. the link on an
    /// ELR record.
    pub fn collect_mileage_file_at(&self, elr: &str, url: &str) -> Result<MileageFile> {
        let html = self.fetcher.fetch(url)?;
        let elr = elr.trim().to_ascii_uppercase();
        let file = self
            .mileage
            .parse_page(&elr, url, &html, self.normalizer.dates())?;
        log::info!(
            "Collected mileage file {} ({} nodes)",
            file.elr,
            file.entries().count()
        );
        Ok(file)
    }

    /// Where two ELRs meet, read from live mileage files.
    pub fn connection_mileages(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Option<ConnectionMileages>> {
        mileage::connect(start, end, |elr| self.collect_mileage_file(elr))
    }

    /// Map of initials to page URLs read from the category index page.
    pub fn catalogue(&self, spec: &CategorySpec) -> Result<BTreeMap<Initial, String>> {
        let Layout::Paginated {
            catalogue_path: Some(path),
            ..
        } = &spec.layout
        else {
            return Err(AppError::validation(format!(
                "category '{}' has no catalogue page",
                spec.id
            )));
        };
        let url = self.base_url.join(path)?.to_string();
        let html = self.fetcher.fetch(&url)?;
        Page::parse(&html, &url)?.catalogue()
    }
}

/// Merge single-initial tables into one.
///
/// Records and notes are concatenated in initial order; the last-updated date
/// is the latest of the constituent dates.
pub fn merge(mut tables: Vec<CategoryTable>) -> MergedCategoryTable {
    tables.sort_by_key(|t| t.initial);

    let mut merged = match tables.first() {
        Some(first) => CategoryTable::empty(&first.category, &first.name, Vec::new()),
        None => CategoryTable::empty(String::new(), String::new(), Vec::new()),
    };
    let mut coverage = Coverage {
        expected: tables.len(),
        ..Coverage::default()
    };

    for table in tables {
        for column in &table.columns {
            if !merged.columns.contains(column) {
                merged.columns.push(column.clone());
            }
        }
        if let Some(initial) = table.initial {
            coverage.succeeded.push(initial);
        }
        merged.last_updated = merged.last_updated.max(table.last_updated);
        merged.records.extend(table.records);
        merged.sources.extend(table.sources);
        merged.notes.extend(table.notes);
        merged.decode_misses += table.decode_misses;
    }
    merged.fill_missing_columns();

    MergedCategoryTable {
        table: merged,
        coverage,
    }
}

/// Merge the tables of one category and record what is missing.
pub fn assemble(
    spec: &CategorySpec,
    tables: Vec<CategoryTable>,
    failed: Vec<InitialFailure>,
    expected: usize,
) -> MergedCategoryTable {
    let mut merged = merge(tables);
    merged.table.category = spec.id.clone();
    merged.table.name = spec.name.clone();
    if merged.table.columns.is_empty() {
        merged.table.columns = spec.column_names();
    }
    merged.coverage.failed = failed;
    merged.coverage.expected = expected;
    merged
}

fn scope_label(spec: &CategorySpec, scope: Scope) -> String {
    match scope {
        Scope::Initial(initial) => initial.to_string(),
        Scope::All => spec.name.clone(),
    }
}
