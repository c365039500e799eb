//! Sync-tool temporary file detection using globset

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

use crate::error::{is_vanishing, Result, StabilityError};

/// Marker patterns a sync tool leaves next to files it is still writing
pub const DEFAULT_TEMP_PATTERNS: &[&str] = &[".syncthing.*.tmp", "*.tmp"];

/// Looks for in-progress temp files belonging to a candidate
pub struct TempFileProbe {
    patterns: GlobSet,
}

impl TempFileProbe {
    pub fn new(patterns: &[String]) -> Result<Self> {
        Ok(Self {
            patterns: build_globset(patterns)?,
        })
    }

    /// Return the first temp marker found for `candidate`, if any.
    ///
    /// A directory is searched recursively for any file matching the marker
    /// patterns. A single file only counts the two sibling markers named
    /// after it, so unrelated temp files in the same folder are ignored.
    pub async fn find_marker(&self, candidate: &Path, is_dir: bool) -> Result<Option<PathBuf>> {
        if is_dir {
            return self.scan_directory(candidate);
        }

        let (Some(parent), Some(name)) = (candidate.parent(), candidate.file_name()) else {
            return Ok(None);
        };
        let name = name.to_string_lossy();

        for marker in [format!(".syncthing.{}.tmp", name), format!("{}.tmp", name)] {
            let marker_path = parent.join(marker);
            if fs::symlink_metadata(&marker_path).await.is_ok() {
                return Ok(Some(marker_path));
            }
        }

        Ok(None)
    }

    fn scan_directory(&self, root: &Path) -> Result<Option<PathBuf>> {
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // Entries may vanish while the sync tool renames them
                    if e.io_error().map(|io| is_vanishing(io.kind())) == Some(true) {
                        continue;
                    }
                    return Err(StabilityError::scan_error(root, format!("Walk error: {}", e)));
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            if self.patterns.is_match(entry.file_name()) {
                return Ok(Some(entry.into_path()));
            }
        }

        Ok(None)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
    }
    Ok(builder.build()?)
}
