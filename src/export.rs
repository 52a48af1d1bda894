use crate::constants::{COMEDIAN_DELIMITER, DELIMITER_REPLACEMENT};
use crate::error::Result;
use crate::types::Snapshot;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SHOWS_HEADERS: [&str; 6] = [
    "show_id",
    "date",
    "time",
    "venue",
    "comedian_count",
    "comedians",
];

pub const APPEARANCES_HEADERS: [&str; 9] = [
    "show_id",
    "date",
    "time",
    "venue",
    "comedian_name",
    "order",
    "description",
    "website",
    "thumb_url",
];

pub const SUMMARY_HEADERS: [&str; 6] = [
    "total_shows",
    "unique_dates_with_shows",
    "unique_comedians",
    "unique_venues",
    "total_comedian_appearances",
    "scrape_date",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowRow {
    pub show_id: String,
    pub date: String,
    pub time: String,
    pub venue: String,
    pub comedian_count: usize,
    pub comedians: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppearanceRow {
    pub show_id: String,
    pub date: String,
    pub time: String,
    pub venue: String,
    pub comedian_name: String,
    pub order: usize,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub thumb_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub total_shows: usize,
    pub unique_dates_with_shows: usize,
    pub unique_comedians: usize,
    pub unique_venues: usize,
    pub total_comedian_appearances: usize,
    pub scrape_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTables {
    pub shows: Vec<ShowRow>,
    pub appearances: Vec<AppearanceRow>,
    pub summary: SummaryRow,
}

#[derive(Debug, Clone)]
pub struct ExportPaths {
    pub shows: PathBuf,
    pub appearances: PathBuf,
    pub summary: PathBuf,
}

/// Replace the delimiter character inside a name so the joined field splits
/// back into exactly one entry per performer.
pub fn escape_name(name: &str) -> String {
    name.replace(';', &DELIMITER_REPLACEMENT.to_string())
}

pub fn join_comedians(names: &[String]) -> String {
    names
        .iter()
        .map(|n| escape_name(n))
        .collect::<Vec<_>>()
        .join(COMEDIAN_DELIMITER)
}

/// Build the three output relations from a finalized snapshot.
pub fn export(snapshot: &Snapshot, scraped_at: DateTime<Local>) -> ExportTables {
    let shows: Vec<ShowRow> = snapshot
        .shows
        .iter()
        .map(|show| ShowRow {
            show_id: show.show_id.clone(),
            date: show.date.format("%Y-%m-%d").to_string(),
            time: show.time.clone(),
            venue: show.venue.clone(),
            comedian_count: show.comedian_count(),
            comedians: join_comedians(&show.comedians),
        })
        .collect();

    let appearances: Vec<AppearanceRow> = snapshot
        .appearances
        .iter()
        .map(|a| AppearanceRow {
            show_id: a.show_id.clone(),
            date: a.date.format("%Y-%m-%d").to_string(),
            time: a.time.clone(),
            venue: a.venue.clone(),
            comedian_name: a.comedian_name.clone(),
            order: a.order,
            description: a.description.clone(),
            website: a.website.clone(),
            thumb_url: a.thumb_url.clone(),
        })
        .collect();

    let dates: HashSet<_> = snapshot.shows.iter().map(|s| s.date).collect();
    let venues: HashSet<&str> = snapshot.shows.iter().map(|s| s.venue.as_str()).collect();
    let comedians: HashSet<&str> = snapshot
        .appearances
        .iter()
        .map(|a| a.comedian_name.as_str())
        .collect();

    let summary = SummaryRow {
        total_shows: shows.len(),
        unique_dates_with_shows: dates.len(),
        unique_comedians: comedians.len(),
        unique_venues: venues.len(),
        total_comedian_appearances: appearances.len(),
        scrape_date: scraped_at.format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    ExportTables {
        shows,
        appearances,
        summary,
    }
}

/// Write rows under an explicit header so empty tables still carry their
/// column contract.
pub fn write_table<T: Serialize>(path: &Path, headers: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(headers)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write `<base>_shows.csv`, `<base>_comedians.csv` and `<base>_summary.csv`
/// into `dir`.
pub fn write_csv(tables: &ExportTables, dir: &Path, base_name: &str) -> Result<ExportPaths> {
    fs::create_dir_all(dir)?;
    let paths = ExportPaths {
        shows: dir.join(format!("{base_name}_shows.csv")),
        appearances: dir.join(format!("{base_name}_comedians.csv")),
        summary: dir.join(format!("{base_name}_summary.csv")),
    };

    write_table(&paths.shows, &SHOWS_HEADERS, &tables.shows)?;
    write_table(&paths.appearances, &APPEARANCES_HEADERS, &tables.appearances)?;
    write_table(
        &paths.summary,
        &SUMMARY_HEADERS,
        std::slice::from_ref(&tables.summary),
    )?;

    info!("Exported data to:");
    info!("  Shows: {}", paths.shows.display());
    info!("  Comedians: {}", paths.appearances.display());
    info!("  Summary: {}", paths.summary.display());
    info!("Total shows: {}", tables.summary.total_shows);
    info!(
        "Total comedian appearances: {}",
        tables.summary.total_comedian_appearances
    );
    info!("Unique comedians: {}", tables.summary.unique_comedians);
    Ok(paths)
}

pub fn read_appearances(path: &Path) -> Result<Vec<AppearanceRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Default enrichment outputs next to an appearances table:
/// `<base>_comedians_enriched.csv` and `<base>_comedian_profiles.csv`.
pub fn enrichment_paths(appearances: &Path) -> (PathBuf, PathBuf) {
    let stem = appearances
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "comedians".to_string());
    let base = stem.strip_suffix("_comedians").unwrap_or(&stem);
    (
        appearances.with_file_name(format!("{stem}_enriched.csv")),
        appearances.with_file_name(format!("{base}_comedian_profiles.csv")),
    )
}

/// Most recently modified `*_comedians.csv` in `dir`.
pub fn find_latest_appearances(dir: &Path) -> Result<Option<PathBuf>> {
    let mut latest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_match = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with("_comedians.csv"))
            .unwrap_or(false);
        if !is_match {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        if latest.as_ref().map_or(true, |(t, _)| modified > *t) {
            latest = Some((modified, path));
        }
    }
    Ok(latest.map(|(_, p)| p))
}
