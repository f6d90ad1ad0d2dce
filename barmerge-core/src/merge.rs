//! Merge pipeline: origin file → matched archive file → merged + renamed.
//!
//! Each origin file moves through `Unprocessed → Matched → Appended → Renamed`.
//!
//! The archive file is never appended to in place. The merged content is
//! written to a temporary file in the destination directory, fsynced, then
//! persisted under the new name (no clobber) before the old name is removed.
//! A crash therefore leaves either the untouched original or the complete
//! merged file, never a half-merged file under a stale name.

use crate::config::{DirectoryRole, MergeConfig};
use crate::error::{FileStage, MergeError};
use crate::filename::{FilenamePattern, SeriesName};
use crate::listing::{check_directory, list_files, DestinationListing, FileListing};
use crate::matcher::find_destination;
use crate::progress::MergeProgress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Why an origin file was not processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Listed in the skip-list (e.g. `.DS_Store`).
    SkipList,
    /// Name does not follow the series filename pattern.
    Unparseable,
    /// Not a readable regular file: a dangling link, or a name that is not
    /// valid UTF-8.
    Unusable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::SkipList => f.write_str("in skip-list"),
            SkipReason::Unparseable => f.write_str("not a series filename"),
            SkipReason::Unusable => f.write_str("not a readable regular file"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: SkipReason,
}

/// One planned merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeJob {
    /// Origin filename.
    pub source: String,
    pub source_series: SeriesName,
    /// Archive filename before the merge.
    pub destination: String,
    pub destination_series: SeriesName,
    /// Archive filename after the merge.
    pub renamed_to: String,
    /// Other archive files that matched the same series.
    pub ambiguous: Vec<String>,
}

impl MergeJob {
    pub fn renames(&self) -> bool {
        self.destination != self.renamed_to
    }
}

/// What a completed merge did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    pub source: String,
    pub destination: String,
    pub renamed_to: String,
    pub bytes_appended: u64,
    pub rows_appended: usize,
    pub ambiguous: Vec<String>,
}

/// Result of planning a run without touching the archive.
#[derive(Debug, Default)]
pub struct MergePlan {
    pub jobs: Vec<MergeJob>,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<MergeError>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty() && self.skipped.is_empty() && self.failures.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Summary of a merge run.
#[derive(Debug, Default)]
pub struct MergeSummary {
    pub total: usize,
    pub merged: Vec<MergeReport>,
    pub skipped: Vec<SkippedFile>,
    pub failures: Vec<MergeError>,
}

impl MergeSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Runs the merge pipeline for one origin/destination pair.
#[derive(Debug, Clone)]
pub struct Merger {
    config: MergeConfig,
    origin: PathBuf,
    destination: PathBuf,
    pattern: FilenamePattern,
}

impl Merger {
    pub fn new(config: MergeConfig) -> Result<Self, MergeError> {
        config.validate()?;
        let (origin, destination) = config.directories()?;
        let (origin, destination) = (origin.to_path_buf(), destination.to_path_buf());
        let pattern = config.pattern.build()?;
        Ok(Self {
            config,
            origin,
            destination,
            pattern,
        })
    }

    pub fn origin(&self) -> &Path {
        &self.origin
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Work out every merge a run would perform, without mutating anything.
    pub fn plan(&self) -> Result<MergePlan, MergeError> {
        let (sources, mut listing) = self.snapshot()?;
        let mut plan = MergePlan {
            skipped: unusable(&sources),
            ..MergePlan::default()
        };

        for name in &sources.files {
            let series = match self.classify(name) {
                Ok(series) => series,
                Err(skipped) => {
                    plan.skipped.push(skipped);
                    continue;
                }
            };
            match self.resolve(name, series, &listing) {
                Ok(job) => {
                    listing.rename(&job.destination, &job.renamed_to);
                    plan.jobs.push(job);
                }
                Err(e) => plan.failures.push(e),
            }
        }

        Ok(plan)
    }

    /// Merge every origin file into its archive file.
    ///
    /// Only fatal errors are returned as `Err`; per-file failures are
    /// collected in the summary and the batch carries on.
    pub fn run(&self, progress: &dyn MergeProgress) -> Result<MergeSummary, MergeError> {
        let (sources, mut listing) = self.snapshot()?;
        let total = sources.files.len() + sources.unusable.len();
        let mut summary = MergeSummary {
            total,
            ..MergeSummary::default()
        };

        for (i, skipped) in unusable(&sources).into_iter().enumerate() {
            progress.on_skip(&skipped, i, total);
            summary.skipped.push(skipped);
        }

        let offset = sources.unusable.len();
        for (i, name) in sources.files.iter().enumerate() {
            let i = offset + i;
            let series = match self.classify(name) {
                Ok(series) => series,
                Err(skipped) => {
                    progress.on_skip(&skipped, i, total);
                    summary.skipped.push(skipped);
                    continue;
                }
            };

            progress.on_start(name, i, total);
            let result = match self.resolve(name, series, &listing) {
                Ok(job) => {
                    let result = self.apply(&job);
                    track_outcome(&mut listing, &job, &result);
                    result
                }
                Err(e) => Err(e),
            };
            progress.on_complete(name, i, total, &result);

            match result {
                Ok(report) => summary.merged.push(report),
                Err(e) => {
                    warn!(file = %name, "merge failed: {e}");
                    summary.failures.push(e);
                }
            }
        }

        info!(
            merged = summary.merged.len(),
            skipped = summary.skipped.len(),
            failed = summary.failures.len(),
            "merge run finished"
        );
        progress.on_batch_complete(&summary);
        Ok(summary)
    }

    fn snapshot(&self) -> Result<(FileListing, DestinationListing), MergeError> {
        check_directory(&self.origin, DirectoryRole::Origin)?;
        check_directory(&self.destination, DirectoryRole::Destination)?;
        let sources = list_files(&self.origin, DirectoryRole::Origin)?;
        let listing = DestinationListing::scan(&self.destination)?;
        if listing.is_empty() && !sources.files.is_empty() {
            warn!(
                destination = %self.destination.display(),
                "destination directory holds no files; nothing can be matched"
            );
        }
        debug!(
            origin_files = sources.files.len(),
            unusable = sources.unusable.len(),
            destination_files = listing.len(),
            "took directory snapshot"
        );
        Ok((sources, listing))
    }

    /// Parse an origin filename, or say why it is skipped.
    fn classify(&self, name: &str) -> Result<SeriesName, SkippedFile> {
        if self.config.is_skipped(name) {
            debug!(file = %name, "skipping listed file");
            return Err(SkippedFile {
                file: name.to_string(),
                reason: SkipReason::SkipList,
            });
        }
        self.pattern.parse(name).map_err(|e| {
            warn!(file = %name, "skipping: {e}");
            SkippedFile {
                file: name.to_string(),
                reason: SkipReason::Unparseable,
            }
        })
    }

    /// Match an origin file to its archive file and compute the new name.
    fn resolve(
        &self,
        name: &str,
        series: SeriesName,
        listing: &DestinationListing,
    ) -> Result<MergeJob, MergeError> {
        let key = series.key();
        let found = find_destination(&key, listing.names(), &self.pattern).ok_or_else(|| {
            MergeError::NoDestination {
                file: name.to_string(),
                key: key.clone(),
            }
        })?;

        if !found.ambiguous.is_empty() {
            warn!(
                file = %name,
                chosen = %found.name,
                others = ?found.ambiguous,
                "several archive files match series '{key}'; using the first"
            );
        }
        warn_on_range_anomalies(name, &found.series, &series);

        let renamed_to = found
            .series
            .extended_to(&series.end)
            .file_name(self.config.extension());

        if renamed_to != found.name && listing.contains(&renamed_to) {
            return Err(MergeError::RenameCollision {
                file: name.to_string(),
                from: found.name,
                to: renamed_to,
            });
        }

        Ok(MergeJob {
            source: name.to_string(),
            source_series: series,
            destination: found.name,
            destination_series: found.series,
            renamed_to,
            ambiguous: found.ambiguous,
        })
    }

    /// Write `archive ++ origin` to a temp file and commit it under the new name.
    fn apply(&self, job: &MergeJob) -> Result<MergeReport, MergeError> {
        let file = job.source.as_str();
        let source_path = self.origin.join(&job.source);
        let dest_path = self.destination.join(&job.destination);
        let target_path = self.destination.join(&job.renamed_to);

        let collision = || MergeError::RenameCollision {
            file: file.to_string(),
            from: job.destination.clone(),
            to: job.renamed_to.clone(),
        };
        if job.renames() && target_path.exists() {
            return Err(collision());
        }

        // Matched
        let mut rows =
            fs::read(&source_path).map_err(MergeError::io(file, FileStage::Matched, &source_path))?;
        if self.config.strip_source_header {
            rows = strip_first_line(rows);
        }

        let mut existing =
            File::open(&dest_path).map_err(MergeError::io(file, FileStage::Matched, &dest_path))?;
        let permissions = existing
            .metadata()
            .map_err(MergeError::io(file, FileStage::Matched, &dest_path))?
            .permissions();

        let mut tmp = NamedTempFile::new_in(&self.destination)
            .map_err(MergeError::io(file, FileStage::Matched, &self.destination))?;
        let tmp_path = tmp.path().to_path_buf();
        io::copy(&mut existing, tmp.as_file_mut())
            .and_then(|_| tmp.write_all(&rows))
            .and_then(|_| tmp.as_file().sync_all())
            .and_then(|_| fs::set_permissions(&tmp_path, permissions))
            .map_err(MergeError::io(file, FileStage::Matched, &tmp_path))?;
        drop(existing);

        // Appended
        if job.renames() {
            tmp.persist_noclobber(&target_path).map_err(|e| {
                if e.error.kind() == io::ErrorKind::AlreadyExists {
                    collision()
                } else {
                    MergeError::io(file, FileStage::Appended, &target_path)(e.error)
                }
            })?;
            fs::remove_file(&dest_path)
                .map_err(MergeError::io(file, FileStage::Renamed, &dest_path))?;
        } else {
            tmp.persist(&dest_path)
                .map_err(|e| MergeError::io(file, FileStage::Appended, &dest_path)(e.error))?;
        }

        // Renamed
        let report = MergeReport {
            source: job.source.clone(),
            destination: job.destination.clone(),
            renamed_to: job.renamed_to.clone(),
            bytes_appended: rows.len() as u64,
            rows_appended: count_rows(&rows),
            ambiguous: job.ambiguous.clone(),
        };
        info!(
            file = %job.source,
            destination = %job.destination,
            renamed_to = %job.renamed_to,
            rows = report.rows_appended,
            "merged"
        );
        Ok(report)
    }
}

fn unusable(sources: &FileListing) -> Vec<SkippedFile> {
    sources
        .unusable
        .iter()
        .map(|file| SkippedFile {
            file: file.clone(),
            reason: SkipReason::Unusable,
        })
        .collect()
}

/// Bring the in-memory listing in line with what a merge left on disk.
fn track_outcome(
    listing: &mut DestinationListing,
    job: &MergeJob,
    result: &Result<MergeReport, MergeError>,
) {
    match result {
        Ok(_) => listing.rename(&job.destination, &job.renamed_to),
        // The merged file is in place but the old name could not be removed.
        // Later files for the series go to the merged file.
        Err(e) if e.stage() == FileStage::Renamed => {
            warn!(
                stale = %job.destination,
                merged = %job.renamed_to,
                "unmerged archive file left behind; remove it by hand"
            );
            listing.rename(&job.destination, &job.renamed_to);
        }
        Err(_) => {}
    }
}

/// Log what the two date ranges imply. Nothing here blocks the merge.
fn warn_on_range_anomalies(file: &str, archive: &SeriesName, incoming: &SeriesName) {
    if incoming.end < archive.end {
        warn!(
            file = %file,
            "origin ends ({}) before the archive does ({}); the archive name will move back",
            incoming.end,
            archive.end
        );
        return;
    }
    match (incoming.start.to_naive_date(), archive.end.to_naive_date()) {
        (Some(start), Some(end)) if start < end => warn!(
            file = %file,
            overlap_days = (end - start).num_days(),
            "date ranges overlap; rows are appended without deduplication"
        ),
        (Some(_), Some(_)) => {}
        _ => debug!(file = %file, "date stamps are not calendar dates"),
    }
}

/// Drop everything up to and including the first newline.
fn strip_first_line(mut bytes: Vec<u8>) -> Vec<u8> {
    match bytes.iter().position(|&b| b == b'\n') {
        Some(i) => bytes.split_off(i + 1),
        None => Vec::new(),
    }
}

fn count_rows(bytes: &[u8]) -> usize {
    csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes)
        .byte_records()
        .filter_map(Result::ok)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_first_line_variants() {
        assert_eq!(strip_first_line(b"h\nr1\nr2\n".to_vec()), b"r1\nr2\n".to_vec());
        assert_eq!(strip_first_line(b"only header".to_vec()), Vec::<u8>::new());
        assert_eq!(strip_first_line(Vec::new()), Vec::<u8>::new());
    }

    #[test]
    fn counts_csv_rows() {
        assert_eq!(count_rows(b""), 0);
        assert_eq!(
            count_rows(b"20230102, 1.0, 1.1, 1.05, 100\n20230103, 1.1, 1.2, 1.15, 200\n"),
            2
        );
        assert_eq!(count_rows(b"a,b\nc"), 2);
    }

    #[test]
    fn skip_reason_display() {
        assert_eq!(SkipReason::SkipList.to_string(), "in skip-list");
        assert_eq!(SkipReason::Unparseable.to_string(), "not a series filename");
        assert_eq!(SkipReason::Unusable.to_string(), "not a readable regular file");
    }

    fn merger_with_archive(archive: &str) -> (tempfile::TempDir, tempfile::TempDir, Merger) {
        let origin = tempfile::tempdir().unwrap();
        let destination = tempfile::tempdir().unwrap();
        fs::write(destination.path().join(archive), "a\n").unwrap();
        let merger = Merger::new(MergeConfig::new(origin.path(), destination.path())).unwrap();
        (origin, destination, merger)
    }

    fn series(name: &str) -> SeriesName {
        FilenamePattern::default().parse(name).unwrap()
    }

    #[test]
    fn old_name_left_behind_is_not_matched_again() {
        let (_origin, destination, merger) = merger_with_archive("AAPL 1d 20220101-20230101.csv");
        let mut listing = DestinationListing::scan(destination.path()).unwrap();

        let first = "AAPL 1d 20230101-20230201.csv";
        let job = merger.resolve(first, series(first), &listing).unwrap();
        // Merged file persisted, old name could not be removed.
        fs::write(destination.path().join(&job.renamed_to), "a\nb\n").unwrap();
        let failed = Err(MergeError::Io {
            file: first.to_string(),
            stage: FileStage::Renamed,
            path: destination.path().join(&job.destination),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "busy"),
        });
        track_outcome(&mut listing, &job, &failed);

        let second = "AAPL 1d 20230201-20230301.csv";
        let next = merger.resolve(second, series(second), &listing).unwrap();
        assert_eq!(next.destination, "AAPL 1d 20220101-20230201.csv");
        assert_eq!(next.renamed_to, "AAPL 1d 20220101-20230301.csv");
        assert!(next.ambiguous.is_empty());
    }

    #[test]
    fn failure_before_commit_keeps_listing() {
        let (_origin, destination, merger) = merger_with_archive("AAPL 1d 20220101-20230101.csv");
        let mut listing = DestinationListing::scan(destination.path()).unwrap();

        let first = "AAPL 1d 20230101-20230201.csv";
        let job = merger.resolve(first, series(first), &listing).unwrap();
        let failed = Err(MergeError::Io {
            file: first.to_string(),
            stage: FileStage::Matched,
            path: destination.path().join(first),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        });
        track_outcome(&mut listing, &job, &failed);

        assert!(listing.contains("AAPL 1d 20220101-20230101.csv"));
        assert!(!listing.contains("AAPL 1d 20220101-20230201.csv"));
    }
}
