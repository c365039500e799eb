//! Download directory scanning using walkdir and tokio::fs

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{is_vanishing, Result, StabilityError};

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "m2ts",
];

/// Options for building the processing queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Entry names never queued or descended into
    pub skip_dirs: Vec<String>,
    /// Grouping directories whose children are queued instead of the directory itself
    pub parent_dirs: Vec<String>,
    /// Extensions (without the dot, case-insensitive) that count as video
    pub video_extensions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            skip_dirs: vec!["@eaDir".to_string()],
            parent_dirs: vec!["TV_Shows".to_string(), "Movies".to_string()],
            video_extensions: DEFAULT_VIDEO_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Builds the list of candidates from the download directory
pub struct QueueScanner {
    options: ScanOptions,
}

impl QueueScanner {
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Candidates in the download directory, sorted by path.
    ///
    /// A missing download directory yields an empty queue.
    pub async fn scan<P: AsRef<Path>>(&self, download_dir: P) -> Result<Vec<PathBuf>> {
        let download_dir = download_dir.as_ref();

        match fs::metadata(download_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(StabilityError::path_error(
                    download_dir,
                    "Path is not a directory",
                ))
            }
            Err(_) => {
                warn!("Download directory does not exist: {}", download_dir.display());
                return Ok(Vec::new());
            }
        }

        let mut queue = Vec::new();
        let mut pending = vec![download_dir.to_path_buf()];

        // Parent directories expand in place, nested ones included
        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir).await.map_err(|e| {
                StabilityError::scan_error(&dir, format!("Failed to read directory: {}", e))
            })?;

            while let Some(entry) = entries.next_entry().await.map_err(|e| {
                StabilityError::scan_error(&dir, format!("Failed to read entry: {}", e))
            })? {
                let path = entry.path();
                let name = entry.file_name().to_string_lossy().into_owned();

                if name.starts_with('.') {
                    continue;
                }
                if self.options.skip_dirs.iter().any(|s| s == &name) {
                    debug!("Skipping excluded entry: {}", name);
                    continue;
                }

                let Ok(file_type) = entry.file_type().await else {
                    continue;
                };

                if file_type.is_dir() {
                    if self.options.parent_dirs.iter().any(|p| p == &name) {
                        debug!("Expanding parent directory: {}", name);
                        pending.push(path);
                    } else if self.contains_video(&path) {
                        queue.push(path);
                    } else {
                        debug!("Skipping directory without videos: {}", name);
                    }
                } else if file_type.is_file() {
                    if self.is_video(&path) {
                        queue.push(path);
                    } else {
                        debug!("Skipping non-video file: {}", name);
                    }
                }
            }
        }

        queue.sort();
        Ok(queue)
    }

    pub fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.options
                    .video_extensions
                    .iter()
                    .any(|v| v.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    fn contains_video(&self, dir: &Path) -> bool {
        WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Error checking directory {}: {}", dir.display(), e);
                    None
                }
            })
            .any(|entry| entry.file_type().is_file() && self.is_video(entry.path()))
    }
}

/// Every regular file under a candidate; a file candidate is its own list.
///
/// Fails with [`StabilityError::FileVanished`] when the candidate itself is gone.
pub fn collect_files(candidate: &Path) -> Result<Vec<PathBuf>> {
    let meta = std::fs::symlink_metadata(candidate).map_err(|e| StabilityError::from_io(candidate, e))?;
    if !meta.is_dir() {
        return Ok(vec![candidate.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(candidate).follow_links(false) {
        let entry = entry.map_err(|e| match e.io_error().map(|io| io.kind()) {
            Some(kind) if is_vanishing(kind) => StabilityError::vanished(candidate),
            _ => StabilityError::scan_error(candidate, format!("Walk error: {}", e)),
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, b"x").await.unwrap();
    }

    #[tokio::test]
    async fn test_queue_building() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        touch(&root.join("Movie.2020.1080p.mkv")).await;
        touch(&root.join("readme.txt")).await;
        touch(&root.join(".hidden.mkv")).await;
        touch(&root.join("@eaDir/thumb.mkv")).await;
        touch(&root.join("Show.S01/e01.MKV")).await;
        touch(&root.join("NoVideo/info.nfo")).await;
        touch(&root.join("TV_Shows/Other.Show.S02/e01.mp4")).await;
        touch(&root.join("TV_Shows/Movies/Nested.Movie.avi")).await;

        let queue = QueueScanner::new(ScanOptions::default()).scan(root).await.unwrap();

        let mut expected = vec![
            root.join("Movie.2020.1080p.mkv"),
            root.join("Show.S01"),
            root.join("TV_Shows/Other.Show.S02"),
            root.join("TV_Shows/Movies/Nested.Movie.avi"),
        ];
        expected.sort();
        assert_eq!(queue, expected);
    }

    #[tokio::test]
    async fn test_missing_download_dir_is_empty_queue() {
        let temp_dir = TempDir::new().unwrap();
        let queue = QueueScanner::new(ScanOptions::default())
            .scan(temp_dir.path().join("missing"))
            .await
            .unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_collect_files() {
        let temp_dir = TempDir::new().unwrap();
        let show = temp_dir.path().join("Show");
        touch(&show.join("e01.mkv")).await;
        touch(&show.join("Subs/e01.srt")).await;
        fs::create_dir_all(show.join("Empty")).await.unwrap();

        let files = collect_files(&show).unwrap();
        assert_eq!(files, vec![show.join("Subs/e01.srt"), show.join("e01.mkv")]);

        let empty = temp_dir.path().join("Bare");
        fs::create_dir_all(&empty).await.unwrap();
        assert!(collect_files(&empty).unwrap().is_empty());

        assert!(collect_files(&temp_dir.path().join("gone")).unwrap_err().is_vanished());
    }
}
