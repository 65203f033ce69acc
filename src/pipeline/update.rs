// src/pipeline/update.rs

//! Backup data update pipeline.

use crate::error::Result;
use crate::services::{CodeRepository, UpdateReport, UpdateStatus};

/// Refresh the snapshots of one category, or of all of them.
pub fn run_update(
    repository: &CodeRepository<'_>,
    category: Option<&str>,
    force: bool,
) -> Result<Vec<UpdateReport>> {
    let reports = match category {
        Some(id) => vec![repository.update_backup(id, force)?],
        None => repository.update_all(force)?,
    };

    for report in &reports {
        match &report.status {
            UpdateStatus::Skipped => log::info!("{}: up to date", report.category),
            UpdateStatus::Updated { changed } => {
                log::info!(
                    "{}: {} records{}",
                    report.category,
                    report.records,
                    if *changed { "" } else { " (no changes)" }
                );
                if !report.reused.is_empty() {
                    log::warn!(
                        "{}: kept previous data for {:?}",
                        report.category,
                        report.reused
                    );
                }
                if !report.coverage.failed.is_empty() {
                    log::warn!(
                        "{}: no data for {:?}",
                        report.category,
                        report.coverage.failed_initials()
                    );
                }
            }
            UpdateStatus::Failed { reason } => log::error!("{}: {}", report.category, reason),
        }
    }

    let updated = reports
        .iter()
        .filter(|r| matches!(r.status, UpdateStatus::Updated { .. }))
        .count();
    log::info!("Updated {}/{} categories", updated, reports.len());

    Ok(reports)
}
