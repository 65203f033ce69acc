// src/pipeline/mileage.rs

//! Mileage file and junction distance lookups.

use crate::error::Result;
use crate::models::{ConnectionMileages, MileageFile};
use crate::services::{CodeRepository, Provenance};

/// Serve the mileage file of `elr`, saving a live copy when `save` is set.
pub fn run_mileage(repository: &CodeRepository<'_>, elr: &str, save: bool) -> Result<MileageFile> {
    log::info!("Collecting mileage file {}", elr);
    let response = repository.mileage_file(elr)?;
    let file = &response.file;

    match response.provenance {
        Provenance::Live => log::info!(
            "{} {}: {} measures, {} nodes (live)",
            file.elr,
            file.line,
            file.measures.len(),
            file.entries().count()
        ),
        Provenance::Snapshot => log::info!("{} {}: saved copy", file.elr, file.line),
    }

    if save {
        if response.is_live() {
            repository.save_mileage_file(&response)?;
        } else {
            log::warn!("Not saving {}: served from a saved copy", file.elr);
        }
    }
    Ok(response.file)
}

/// Find where `start` meets `end`.
pub fn run_connect(
    repository: &CodeRepository<'_>,
    start: &str,
    end: &str,
) -> Result<Option<ConnectionMileages>> {
    let connection = repository.connection_mileages(start, end)?;
    match &connection {
        Some(c) => match &c.via {
            Some(via) => log::info!(
                "{} {} -> {} {}-{} -> {} {}",
                c.start_elr,
                c.start_exit,
                via.elr,
                via.entry,
                via.exit,
                c.end_elr,
                c.end_entry
            ),
            None => log::info!(
                "{} {} -> {} {}",
                c.start_elr,
                c.start_exit,
                c.end_elr,
                c.end_entry
            ),
        },
        None => log::warn!("No connection found between {} and {}", start, end),
    }
    Ok(connection)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::models::Config;
    use crate::services::resolver::tests::MockFetcher;
    use crate::services::{CategoryResolver, FixedGate};
    use crate::storage::{LocalSnapshotStore, SnapshotStore};

    const URL: &str = "http://www.railwaycodes.org.uk/elrs/_mileages/a/aav.shtm";
    const PAGE: &str = "<html><body><h3>AAV\tAshchurch and Evesham</h3>\
        <pre>\n0.00\tAshchurch\n11.42\tEvesham with OWW\n</pre></body></html>";

    #[test]
    fn mileage_writes_only_when_asked() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);
        let fetcher = MockFetcher::default().with_page(URL, PAGE);
        let gate = FixedGate(true);
        let resolver = CategoryResolver::new(&fetcher, &Config::default())
            .unwrap()
            .with_delay(Duration::ZERO);
        let repository = CodeRepository::new(resolver, &gate, &store, &[]);

        let file = run_mileage(&repository, "AAV", false).unwrap();
        assert_eq!(file.entries().count(), 2);
        assert!(store.load_mileage_file("AAV").unwrap().is_none());

        run_mileage(&repository, "AAV", true).unwrap();
        assert_eq!(store.load_mileage_file("AAV").unwrap(), Some(file));
    }

    #[test]
    fn unknown_connection_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = LocalSnapshotStore::new(tmp.path(), 30);
        let oww = "<html><body><h3>OWW\tCotswold line</h3><pre>\n40.10\tWorcester\n</pre></body></html>";
        let fetcher = MockFetcher::default()
            .with_page(URL, PAGE)
            .with_page("http://www.railwaycodes.org.uk/elrs/_mileages/o/oww.shtm", oww);
        let gate = FixedGate(true);
        let resolver = CategoryResolver::new(&fetcher, &Config::default())
            .unwrap()
            .with_delay(Duration::ZERO);
        let repository = CodeRepository::new(resolver, &gate, &store, &[]);

        let conn = run_connect(&repository, "AAV", "OWW").unwrap().unwrap();
        assert_eq!(conn.start_exit.to_string(), "11.42");
        // No distance on either side: the junction takes the start distance
        assert_eq!(conn.end_entry.to_string(), "11.42");

        assert!(run_connect(&repository, "OWW", "AAV").unwrap().is_none());
    }
}
