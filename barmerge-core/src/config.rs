//! Merge configuration.
//!
//! Stored as TOML; every field has a default except the two directories,
//! which the CLI may also take from flags or prompts.
//!
//! ```toml
//! origin = "downloads"
//! destination = "archive"
//! extension = "csv"
//! skip = [".DS_Store"]
//! strip_source_header = false
//!
//! [pattern]
//! ticker_max_len = 5
//! anchored = true
//! ```

use crate::filename::{FilenamePattern, ParseError, DEFAULT_TICKER_MAX_LEN, MAX_TICKER_BOUND};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Which side of the merge a directory is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryRole {
    Origin,
    Destination,
    /// A directory that is only listed, never merged into.
    Inspected,
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryRole::Origin => f.write_str("origin"),
            DirectoryRole::Destination => f.write_str("destination"),
            DirectoryRole::Inspected => f.write_str("inspected"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("no {0} directory configured")]
    MissingDirectory(DirectoryRole),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Filename pattern settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Longest ticker accepted in a filename.
    pub ticker_max_len: usize,
    /// Require the pattern to match from the start of the filename.
    pub anchored: bool,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            ticker_max_len: DEFAULT_TICKER_MAX_LEN,
            anchored: true,
        }
    }
}

impl PatternConfig {
    pub fn build(&self) -> Result<FilenamePattern, ParseError> {
        FilenamePattern::new(self.ticker_max_len, self.anchored)
    }
}

/// Everything the merge pipeline needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Directory holding the newly downloaded files.
    pub origin: Option<PathBuf>,
    /// Archive directory the new rows are appended to.
    pub destination: Option<PathBuf>,
    /// Extension given to renamed archive files.
    pub extension: String,
    /// Origin filenames skipped unconditionally.
    pub skip: Vec<String>,
    /// Drop the first line of each origin file before appending.
    pub strip_source_header: bool,
    pub pattern: PatternConfig,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            origin: None,
            destination: None,
            extension: "csv".to_string(),
            skip: vec![".DS_Store".to_string()],
            strip_source_header: false,
            pattern: PatternConfig::default(),
        }
    }
}

impl MergeConfig {
    pub fn new(origin: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            ..Self::default()
        }
    }

    /// Load a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Serialize the config to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Both directories, or the first one that is missing.
    pub fn directories(&self) -> Result<(&Path, &Path), ConfigError> {
        let origin = self
            .origin
            .as_deref()
            .ok_or(ConfigError::MissingDirectory(DirectoryRole::Origin))?;
        let destination = self
            .destination
            .as_deref()
            .ok_or(ConfigError::MissingDirectory(DirectoryRole::Destination))?;
        Ok((origin, destination))
    }

    pub fn is_skipped(&self, file_name: &str) -> bool {
        self.skip.iter().any(|s| s == file_name)
    }

    /// Check everything that can be checked without touching the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (origin, destination) = self.directories()?;
        if origin == destination {
            return Err(ConfigError::Invalid(format!(
                "origin and destination are the same directory: {}",
                origin.display()
            )));
        }
        if !(1..=MAX_TICKER_BOUND).contains(&self.pattern.ticker_max_len) {
            return Err(ConfigError::Invalid(format!(
                "pattern.ticker_max_len must be in 1..={MAX_TICKER_BOUND}, got {}",
                self.pattern.ticker_max_len
            )));
        }
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "extension '{}' is not a valid file extension",
                self.extension
            )));
        }
        Ok(())
    }

    /// Extension without a leading dot.
    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_skip_ds_store() {
        let c = MergeConfig::default();
        assert!(c.is_skipped(".DS_Store"));
        assert!(!c.is_skipped("AAPL 1d 20220101-20230101.csv"));
        assert_eq!(c.pattern.ticker_max_len, 5);
        assert!(c.pattern.anchored);
        assert_eq!(c.extension(), "csv");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c = MergeConfig::from_toml(
            r#"
origin = "downloads"
destination = "archive"

[pattern]
ticker_max_len = 4
"#,
        )
        .unwrap();
        assert_eq!(c.origin.as_deref(), Some(Path::new("downloads")));
        assert_eq!(c.pattern.ticker_max_len, 4);
        assert!(c.pattern.anchored);
        assert_eq!(c.skip, vec![".DS_Store".to_string()]);
        c.validate().unwrap();
    }

    #[test]
    fn toml_roundtrip() {
        let mut c = MergeConfig::new("a", "b");
        c.strip_source_header = true;
        c.skip.push("Thumbs.db".into());
        let parsed = MergeConfig::from_toml(&c.to_toml().unwrap()).unwrap();
        assert_eq!(c, parsed);
    }

    #[test]
    fn missing_directory_is_reported() {
        let c = MergeConfig {
            origin: Some("a".into()),
            ..MergeConfig::default()
        };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::MissingDirectory(DirectoryRole::Destination))
        ));
    }

    #[test]
    fn rejects_same_directory_and_bad_bounds() {
        assert!(MergeConfig::new("a", "a").validate().is_err());

        let mut c = MergeConfig::new("a", "b");
        c.pattern.ticker_max_len = 0;
        assert!(c.validate().is_err());

        let mut c = MergeConfig::new("a", "b");
        c.extension = ".".into();
        assert!(c.validate().is_err());
    }

    #[test]
    fn unknown_toml_is_a_parse_error() {
        assert!(matches!(
            MergeConfig::from_toml("skip = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
