//! Moving settled items into the library

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, StabilityError};

/// Moves files and directories, renaming on collision
#[derive(Debug, Clone, Default)]
pub struct FileMover {
    dry_run: bool,
}

impl FileMover {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    /// Move `source` into `dest_folder`, returning where it ended up.
    ///
    /// In dry-run mode nothing is created or moved and the path it would
    /// have been moved to is returned.
    pub async fn move_item(&self, source: &Path, dest_folder: &Path) -> Result<PathBuf> {
        let meta = fs::symlink_metadata(source)
            .await
            .map_err(|e| StabilityError::from_io(source, e))?;

        let name = source
            .file_name()
            .ok_or_else(|| StabilityError::path_error(source, "Source has no file name"))?;
        let target = dest_folder.join(name);

        if !self.dry_run {
            fs::create_dir_all(dest_folder).await.map_err(|e| {
                StabilityError::move_error(
                    source,
                    dest_folder,
                    format!("Failed to create destination folder: {}", e),
                )
            })?;
        }

        if same_entry(source, &target).await {
            info!("Already in place: {}", target.display());
            return Ok(target);
        }

        let target = unique_destination(&target, meta.is_dir()).await;

        if self.dry_run {
            info!("DRY RUN: Would move '{}' -> '{}'", source.display(), target.display());
            return Ok(target);
        }

        match fs::rename(source, &target).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StabilityError::vanished(source));
            }
            Err(e) => {
                debug!("Rename failed ({}), falling back to copy and remove", e);
                copy_and_remove(source, &target, meta.is_dir()).await?;
            }
        }

        info!("Moved '{}' -> '{}'", source.display(), target.display());
        Ok(target)
    }
}

async fn same_entry(source: &Path, target: &Path) -> bool {
    match (fs::canonicalize(source).await, fs::canonicalize(target).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// `target` if free, otherwise the first free `name_N.ext`
async fn unique_destination(target: &Path, is_dir: bool) -> PathBuf {
    if fs::symlink_metadata(target).await.is_err() {
        return target.to_path_buf();
    }

    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    let (stem, ext) = if is_dir {
        (target.file_name(), None)
    } else {
        (target.file_stem(), target.extension())
    };
    let stem = stem.map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let ext = ext.map(|e| e.to_string_lossy().into_owned());

    let mut counter = 1u32;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, counter, ext),
            None => format!("{}_{}", stem, counter),
        };
        let candidate = parent.join(name);
        if fs::symlink_metadata(&candidate).await.is_err() {
            warn!("Destination exists, using {}", candidate.display());
            return candidate;
        }
        counter += 1;
    }
}

/// Cross-filesystem move
async fn copy_and_remove(source: &Path, target: &Path, is_dir: bool) -> Result<()> {
    let from = source.to_path_buf();
    let to = target.to_path_buf();

    let outcome = tokio::task::spawn_blocking(move || {
        if is_dir {
            let mut options = fs_extra::dir::CopyOptions::new();
            // Copy into `to` itself rather than a child named after the source
            options.copy_inside = true;
            fs_extra::dir::move_dir(&from, &to, &options).map(|_| ())
        } else {
            let options = fs_extra::file::CopyOptions::new();
            fs_extra::file::move_file(&from, &to, &options).map(|_| ())
        }
    })
    .await
    .map_err(|e| StabilityError::move_error(source, target, format!("Move task failed: {}", e)))?;

    outcome.map_err(|e| StabilityError::move_error(source, target, e.to_string()))
}
