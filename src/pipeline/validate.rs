// src/pipeline/validate.rs

use crate::error::Result;
use crate::models::{CategorySpec, Config, Layout};
use crate::utils::parse_selector;

/// Validate configuration and every category declaration.
pub fn run_validate(config: &Config) -> Result<()> {
    log::info!("Validating configuration...");

    if let Err(e) = config.validate().and_then(|()| check_selectors(&config.categories)) {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }

    log::info!("✓ Config OK");
    log::info!("  Source: {}", config.source.base_url);
    log::info!("  User agent: {}", config.http.user_agent);
    log::info!("  Timeout: {}s", config.http.timeout_secs);
    log::info!("  Request delay: {}ms", config.http.request_delay_ms);
    log::info!("  Snapshots: {}", config.storage.snapshot_dir.display());

    for spec in &config.categories {
        let pages = match &spec.layout {
            Layout::Paginated { .. } => format!("{} pages", spec.initials().len()),
            Layout::SinglePage { .. } => "single page".to_string(),
            Layout::Sections { sections } => format!("{} sections", sections.len()),
            Layout::LinkIndex { .. } => "link index".to_string(),
        };
        log::info!(
            "  ✓ {} ({}, {} columns)",
            spec.id,
            pages,
            spec.column_names().len()
        );
    }
    Ok(())
}

fn check_selectors(categories: &[CategorySpec]) -> Result<()> {
    for spec in categories {
        parse_selector(&spec.table_selector)?;
        if let Some(selector) = &spec.notes_selector {
            parse_selector(selector)?;
        }
        if let Layout::LinkIndex { link_selector, .. } = &spec.layout {
            parse_selector(link_selector)?;
        }
    }
    Ok(())
}
