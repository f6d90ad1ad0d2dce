//! Progress reporting for a merge run.

use crate::error::MergeError;
use crate::merge::{MergeReport, MergeSummary, SkippedFile};

/// Progress callback for a merge batch.
pub trait MergeProgress: Send {
    /// Called before an origin file is processed.
    fn on_start(&self, file: &str, index: usize, total: usize);

    /// Called when an origin file is skipped without being processed.
    fn on_skip(&self, skipped: &SkippedFile, index: usize, total: usize);

    /// Called when an origin file has been merged or has failed.
    fn on_complete(
        &self,
        file: &str,
        index: usize,
        total: usize,
        result: &Result<MergeReport, MergeError>,
    );

    /// Called when the entire batch is done.
    fn on_batch_complete(&self, summary: &MergeSummary);
}

/// Prints one line per file to stdout.
pub struct StdoutProgress;

impl MergeProgress for StdoutProgress {
    fn on_start(&self, file: &str, index: usize, total: usize) {
        println!("[{}/{}] {file}", index + 1, total);
    }

    fn on_skip(&self, skipped: &SkippedFile, _index: usize, _total: usize) {
        println!("  SKIP: {} ({})", skipped.file, skipped.reason);
    }

    fn on_complete(
        &self,
        _file: &str,
        _index: usize,
        _total: usize,
        result: &Result<MergeReport, MergeError>,
    ) {
        match result {
            Ok(report) => println!(
                "  OK: {} rows -> {}",
                report.rows_appended, report.renamed_to
            ),
            Err(e) => println!("  FAIL: {e}"),
        }
    }

    fn on_batch_complete(&self, summary: &MergeSummary) {
        println!(
            "\nMerge complete: {} merged, {} skipped, {} failed ({} files)",
            summary.merged.len(),
            summary.skipped.len(),
            summary.failures.len(),
            summary.total
        );
    }
}

/// Reports nothing.
pub struct SilentProgress;

impl MergeProgress for SilentProgress {
    fn on_start(&self, _file: &str, _index: usize, _total: usize) {}

    fn on_skip(&self, _skipped: &SkippedFile, _index: usize, _total: usize) {}

    fn on_complete(
        &self,
        _file: &str,
        _index: usize,
        _total: usize,
        _result: &Result<MergeReport, MergeError>,
    ) {
    }

    fn on_batch_complete(&self, _summary: &MergeSummary) {}
}
