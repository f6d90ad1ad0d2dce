//! Error types for the merge pipeline.
//!
//! Per-file errors are recoverable: the batch records them and moves on to
//! the next origin file. Fatal errors (bad configuration, unusable
//! directories) stop the run before anything is mutated.

use crate::config::{ConfigError, DirectoryRole};
use crate::filename::{ParseError, SeriesKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How far a single origin file got through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStage {
    Unprocessed,
    Matched,
    Appended,
    Renamed,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FileStage::Unprocessed => "unprocessed",
            FileStage::Matched => "matched",
            FileStage::Appended => "appended",
            FileStage::Renamed => "renamed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("{file}: no destination file for series '{key}'")]
    NoDestination { file: String, key: SeriesKey },

    #[error("{file}: cannot rename '{from}' to '{to}': target already exists")]
    RenameCollision {
        file: String,
        from: String,
        to: String,
    },

    #[error("{file}: I/O error on {} (reached {stage}): {source}", path.display())]
    Io {
        file: String,
        stage: FileStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} directory {}: {reason}", path.display())]
    InvalidDirectory {
        role: DirectoryRole,
        path: PathBuf,
        reason: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pattern(#[from] ParseError),
}

impl MergeError {
    /// Fatal errors abort the whole run; the rest only fail one file.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MergeError::InvalidDirectory { .. } | MergeError::Config(_) | MergeError::Pattern(_)
        )
    }

    /// The origin file this error belongs to, for per-file errors.
    pub fn file(&self) -> Option<&str> {
        match self {
            MergeError::NoDestination { file, .. }
            | MergeError::RenameCollision { file, .. }
            | MergeError::Io { file, .. } => Some(file),
            _ => None,
        }
    }

    /// Last stage the file reached before the error.
    pub fn stage(&self) -> FileStage {
        match self {
            MergeError::Io { stage, .. } => *stage,
            MergeError::RenameCollision { .. } => FileStage::Matched,
            _ => FileStage::Unprocessed,
        }
    }

    pub(crate) fn io(
        file: &str,
        stage: FileStage,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> MergeError {
        let file = file.to_string();
        let path = path.into();
        move |source| MergeError::Io {
            file,
            stage,
            path,
            source,
        }
    }

    pub(crate) fn directory(
        role: DirectoryRole,
        path: impl Into<PathBuf>,
        reason: impl Into<String>,
    ) -> MergeError {
        MergeError::InvalidDirectory {
            role,
            path: path.into(),
            reason: reason.into(),
        }
    }
}
