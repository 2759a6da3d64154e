//! Source file discovery
//!
//! Recursively collects every file with the configured extension below a
//! root directory. Traversal is sorted by file name so repeated runs visit
//! files in the same order.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;

/// Files found under one data root
#[derive(Debug, Clone, Default)]
pub struct DiscoveredFiles {
    pub root: PathBuf,
    /// Absolute paths in traversal order
    pub files: Vec<PathBuf>,
}

impl DiscoveredFiles {
    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Walk `root` and return all files whose extension equals `extension`
/// (case-insensitive, with or without a leading dot).
///
/// A missing root is not an error: it yields zero files.
pub fn discover_files(root: &Path, extension: &str) -> Result<DiscoveredFiles> {
    let extension = extension.trim_start_matches('.');

    if !root.exists() {
        warn!(root = %root.display(), "Data directory does not exist, nothing to load");
        return Ok(DiscoveredFiles {
            root: root.to_path_buf(),
            files: Vec::new(),
        });
    }

    let absolute_root = std::path::absolute(root)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(&absolute_root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() && has_extension(entry.path(), extension) {
                    files.push(entry.into_path());
                }
            },
            Err(e) => {
                // Unreadable subdirectories are skipped, not fatal
                warn!(error = %e, "Error accessing entry during discovery");
            },
        }
    }

    debug!(root = %absolute_root.display(), count = files.len(), "Discovery complete");

    Ok(DiscoveredFiles {
        root: absolute_root,
        files,
    })
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}
