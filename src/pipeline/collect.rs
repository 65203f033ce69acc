// src/pipeline/collect.rs

//! Category collection pipeline.

use serde_json::Value as Json;

use crate::error::Result;
use crate::models::Scope;
use crate::services::{CategoryResponse, CodeRepository, Provenance};

/// Serve one category request, returning its triad.
///
/// The response is saved as a snapshot only when `save` is set and the
/// table came from the live site.
pub fn run_collect(
    repository: &CodeRepository<'_>,
    category: &str,
    scope: Scope,
    save: bool,
) -> Result<Json> {
    let spec = repository.category(category)?;
    log::info!("Collecting {} ({})", spec.name, scope);

    let response = repository.request(spec, scope)?;
    report(&response);

    if save {
        if response.is_live() {
            repository.save(spec, &response)?;
        } else {
            log::warn!("Not saving {}: table was served from a snapshot", spec.id);
        }
    }

    Ok(response.to_triad(spec))
}

fn report(response: &CategoryResponse) {
    let table = &response.table;
    match response.provenance {
        Provenance::Live => log::info!("{}: {} records (live)", table.title(), table.len()),
        Provenance::Snapshot => log::info!(
            "{}: {} records (snapshot saved {})",
            table.title(),
            table.len(),
            response
                .saved_at
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default()
        ),
    }

    let coverage = &response.coverage;
    if coverage.expected > 0 && !coverage.is_complete() {
        log::warn!(
            "Partial result: {}/{} initials, missing {:?}",
            coverage.succeeded_count(),
            coverage.expected,
            coverage.failed_initials()
        );
    }
    if table.decode_misses > 0 {
        log::warn!("{} values could not be decoded", table.decode_misses);
    }
}
