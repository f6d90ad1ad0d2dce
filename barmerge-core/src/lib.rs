//! barmerge core: merge incrementally downloaded bar files into an archive.
//!
//! Files on both sides are named `{TICKER} {BAR_SIZE} {yyyymmdd}-{yyyymmdd}.csv`.
//! For every origin file this crate:
//! - parses the filename into a series key and date range
//! - finds the archive file holding the same (ticker, bar size)
//! - appends the origin rows to it
//! - renames it so the name covers the extended range
//!
//! The merge itself goes through a temp file and an atomic rename, so an
//! interrupted run never leaves a half-merged archive file behind.

pub mod config;
pub mod error;
pub mod filename;
pub mod inventory;
pub mod listing;
pub mod matcher;
pub mod merge;
pub mod progress;

pub use config::{ConfigError, DirectoryRole, MergeConfig, PatternConfig};
pub use error::{FileStage, MergeError};
pub use filename::{DateStamp, FilenamePattern, ParseError, SeriesKey, SeriesName};
pub use inventory::{scan_directory, Inventory, SeriesEntry};
pub use listing::{DestinationListing, FileListing};
pub use matcher::{find_destination, DestinationMatch};
pub use merge::{MergeJob, MergePlan, MergeReport, MergeSummary, Merger, SkipReason, SkippedFile};
pub use progress::{MergeProgress, SilentProgress, StdoutProgress};
