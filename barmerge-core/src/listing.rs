//! Directory checks and listings.

use crate::config::DirectoryRole;
use crate::error::MergeError;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Fail unless `path` is an existing, readable directory (and writable when
/// it is the destination).
pub fn check_directory(path: &Path, role: DirectoryRole) -> Result<(), MergeError> {
    let meta = fs::metadata(path).map_err(|e| MergeError::directory(role, path, e.to_string()))?;
    if !meta.is_dir() {
        return Err(MergeError::directory(role, path, "not a directory"));
    }
    fs::read_dir(path)
        .map_err(|e| MergeError::directory(role, path, format!("not readable: {e}")))?;
    if role == DirectoryRole::Destination {
        // Owner, group and ACLs all count here, not just the mode bits.
        NamedTempFile::new_in(path)
            .map_err(|e| MergeError::directory(role, path, format!("not writable: {e}")))?;
    }
    Ok(())
}

/// What a directory listing found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileListing {
    /// Regular files (symlinks followed), sorted.
    pub files: Vec<String>,
    /// Entries that look like files but cannot be used: dangling links,
    /// entries that cannot be stat'ed, names that are not valid UTF-8
    /// (shown lossily). Sorted.
    pub unusable: Vec<String>,
}

/// List `dir`, following symlinks.
///
/// Subdirectories are left out silently; anything else that is not a
/// usable regular file ends up in [`FileListing::unusable`].
pub fn list_files(dir: &Path, role: DirectoryRole) -> Result<FileListing, MergeError> {
    let entries =
        fs::read_dir(dir).map_err(|e| MergeError::directory(role, dir, format!("read dir: {e}")))?;

    let mut listing = FileListing::default();
    for entry in entries {
        let entry =
            entry.map_err(|e| MergeError::directory(role, dir, format!("dir entry: {e}")))?;
        let path = entry.path();
        let name = entry.file_name();

        let meta = match fs::metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %path.display(), "cannot stat entry: {e}");
                listing.unusable.push(name.to_string_lossy().into_owned());
                continue;
            }
        };
        if meta.is_dir() {
            debug!(path = %path.display(), "skipping subdirectory");
            continue;
        }
        if !meta.is_file() {
            warn!(path = %path.display(), "skipping entry that is not a regular file");
            listing.unusable.push(name.to_string_lossy().into_owned());
            continue;
        }
        match name.into_string() {
            Ok(name) => listing.files.push(name),
            Err(raw) => {
                warn!(?raw, "skipping file with non UTF-8 name");
                listing.unusable.push(raw.to_string_lossy().into_owned());
            }
        }
    }

    listing.files.sort();
    listing.unusable.sort();
    Ok(listing)
}

/// The destination directory's filenames, taken once at the start of a run
/// and kept current as files are renamed.
#[derive(Debug, Clone)]
pub struct DestinationListing {
    names: BTreeSet<String>,
}

impl DestinationListing {
    pub fn scan(dir: &Path) -> Result<Self, MergeError> {
        let listing = list_files(dir, DirectoryRole::Destination)?;
        Ok(Self {
            names: listing.files.into_iter().collect(),
        })
    }

    /// Filenames in lexicographic order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Record that `old` now lives under `new`.
    pub fn rename(&mut self, old: &str, new: &str) {
        self.names.remove(old);
        self.names.insert(new.to_string());
    }
}
