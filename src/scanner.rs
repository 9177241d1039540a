use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::error::ConfigError;

/// Extensions accepted for upload, compared case-insensitively
pub const ACCEPTED_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// A file selected for upload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandidateFile {
    pub path: PathBuf,
}

/// Check if a file is a JPEG photo based on its extension
pub fn is_photo_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ACCEPTED_EXTENSIONS.iter().any(|a| ext.eq_ignore_ascii_case(a)))
        .unwrap_or(false)
}

/// Recursive scan of one root directory
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
}

impl Scanner {
    /// Validate the root and prepare a scanner for it
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();

        if !root.exists() {
            return Err(ConfigError::NotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ConfigError::NotADirectory(root.to_path_buf()));
        }

        // Make sure we can actually list it before claiming it is usable
        fs::read_dir(root).map_err(|source| ConfigError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        let root = fs::canonicalize(root).map_err(|source| ConfigError::Unreadable {
            path: root.to_path_buf(),
            source,
        })?;

        Ok(Scanner { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the tree. Each call starts a fresh walk.
    pub fn iter(&self) -> impl Iterator<Item = CandidateFile> + '_ {
        WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry_result| match entry_result {
                Ok(entry) => Some(entry),
                Err(err) => {
                    if let Some(path) = err.path() {
                        warn!("Failed to access {}: {}", path.display(), err);
                    } else {
                        warn!("WalkDir error: {}", err);
                    }
                    None
                }
            })
            // Follows symlinks, so a link to a photo counts as a photo
            .filter(|entry| entry.path().is_file())
            .filter(|entry| is_photo_file(entry.path()))
            .map(|entry| CandidateFile {
                path: entry.into_path(),
            })
    }

    /// Collect every candidate up front so the total is known
    pub fn collect(&self) -> Vec<CandidateFile> {
        info!("Scanning directory recursively: {}", self.root.display());
        let files: Vec<_> = self.iter().collect();
        info!("Found {} JPEG photos", files.len());
        files
    }
}
