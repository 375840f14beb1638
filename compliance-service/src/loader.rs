//! Watchlist feed loading from CSV exports

use crate::error::{ComplianceError, Result};
use crate::types::WatchlistEntry;
use chrono::Utc;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    name: String,
    #[serde(default)]
    aliases: String,
    #[serde(default)]
    countries: String,
}

fn split_multi(field: &str) -> Vec<String> {
    field
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `id,name,aliases,countries` rows; aliases and countries are `;`-separated.
/// Rows that fail to parse are skipped with a warning.
pub fn entries_from_csv<R: Read>(reader: R) -> Result<Vec<WatchlistEntry>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let mut entries = Vec::new();
    for (line, row) in csv_reader.deserialize::<CsvRow>().enumerate() {
        match row {
            Ok(row) if !row.id.is_empty() && !row.name.is_empty() => {
                entries.push(WatchlistEntry {
                    id: row.id,
                    names: vec![row.name],
                    aliases: split_multi(&row.aliases),
                    countries: split_multi(&row.countries),
                    updated_at: Utc::now(),
                });
            }
            Ok(_) => warn!(row = line + 1, "Skipping watchlist row without id or name"),
            Err(e) => warn!(row = line + 1, error = %e, "Skipping malformed watchlist row"),
        }
    }

    Ok(entries)
}

/// Load a CSV watchlist export from disk
pub fn entries_from_path(path: impl AsRef<Path>) -> Result<Vec<WatchlistEntry>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)
        .map_err(|e| ComplianceError::LoadFailed(format!("{}: {}", path.display(), e)))?;
    entries_from_csv(file)
}
