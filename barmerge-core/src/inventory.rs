//! Directory inventory: which series a directory holds and how big they are.

use crate::config::DirectoryRole;
use crate::error::MergeError;
use crate::filename::{FilenamePattern, SeriesName};
use crate::listing::{check_directory, list_files};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// One series file in a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub file: String,
    pub series: SeriesName,
    /// `None` when the file could not be stat'ed.
    pub size_bytes: Option<u64>,
    /// `None` when the file could not be read as CSV.
    pub rows: Option<usize>,
}

impl SeriesEntry {
    /// `yyyy-mm-dd to yyyy-mm-dd`, falling back to the raw stamps.
    pub fn date_range(&self) -> String {
        match (
            self.series.start.to_naive_date(),
            self.series.end.to_naive_date(),
        ) {
            (Some(start), Some(end)) => format!("{start} to {end}"),
            _ => format!("{} to {}", self.series.start, self.series.end),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub entries: Vec<SeriesEntry>,
    pub unparseable: Vec<String>,
    /// Dangling links and names that are not valid UTF-8.
    pub unusable: Vec<String>,
}

impl Inventory {
    /// Sum over the files whose size is known.
    pub fn total_size(&self) -> u64 {
        self.entries.iter().filter_map(|e| e.size_bytes).sum()
    }

    /// Series keys held by more than one file, which would make a merge
    /// into this directory ambiguous.
    pub fn duplicate_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> =
            self.entries.iter().map(|e| e.series.key().to_string()).collect();
        keys.sort();
        let mut dups: Vec<String> = keys
            .windows(2)
            .filter(|w| w[0] == w[1])
            .map(|w| w[0].clone())
            .collect();
        dups.dedup();
        dups
    }
}

/// Scan `dir` and parse every filename with `pattern`.
pub fn scan_directory(dir: &Path, pattern: &FilenamePattern) -> Result<Inventory, MergeError> {
    check_directory(dir, DirectoryRole::Inspected)?;
    let listing = list_files(dir, DirectoryRole::Inspected)?;
    let mut inventory = Inventory {
        unusable: listing.unusable,
        ..Inventory::default()
    };

    for file in listing.files {
        let series = match pattern.parse(&file) {
            Ok(series) => series,
            Err(_) => {
                inventory.unparseable.push(file);
                continue;
            }
        };
        let path = dir.join(&file);
        let size_bytes = match std::fs::metadata(&path) {
            Ok(meta) => Some(meta.len()),
            Err(e) => {
                warn!(path = %path.display(), "cannot stat file: {e}");
                None
            }
        };
        let rows = count_file_rows(&path);
        inventory.entries.push(SeriesEntry {
            file,
            series,
            size_bytes,
            rows,
        });
    }

    Ok(inventory)
}

fn count_file_rows(path: &Path) -> Option<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .ok()?;
    let mut count = 0;
    for record in reader.byte_records() {
        record.ok()?;
        count += 1;
    }
    Some(count)
}
