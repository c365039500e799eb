//! Fuzzy matching of titles against existing library folders

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{Result, StabilityError};
use crate::parser::normalize_title;

pub const DEFAULT_THRESHOLD: u8 = 80;

/// Characters that cannot appear in a folder name
const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

pub struct FolderMatcher {
    threshold: u8,
}

impl Default for FolderMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl FolderMatcher {
    /// `threshold` is a similarity score from 0 to 100
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    /// Similarity of two normalized titles, 0 to 100
    pub fn score(a: &str, b: &str) -> u8 {
        (strsim::normalized_levenshtein(a, b) * 100.0).round() as u8
    }

    /// Best existing folder at or above the threshold
    pub async fn find_match(&self, title: &str, library_dir: &Path) -> Result<Option<PathBuf>> {
        let mut entries = match fs::read_dir(library_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Library directory does not exist: {}", library_dir.display());
                return Ok(None);
            }
            Err(e) => return Err(StabilityError::from_io(library_dir, e)),
        };

        let wanted = normalize_title(title);
        let mut best: Option<(u8, PathBuf)> = None;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StabilityError::scan_error(library_dir, e.to_string()))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            let score = Self::score(&wanted, &normalize_title(&name));
            // Ties keep the lexically smaller name so results don't depend on read_dir order
            let better = match &best {
                None => true,
                Some((best_score, best_path)) => {
                    score > *best_score || (score == *best_score && entry.path() < *best_path)
                }
            };
            if better {
                best = Some((score, entry.path()));
            }
        }

        match best {
            Some((score, path)) if score >= self.threshold => {
                info!(
                    "Fuzzy match: '{}' -> '{}' (score: {})",
                    title,
                    path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
                    score
                );
                Ok(Some(path))
            }
            Some((score, path)) => {
                debug!(
                    "Best match for '{}' was '{}' with score {} (below threshold {})",
                    title,
                    path.display(),
                    score,
                    self.threshold
                );
                Ok(None)
            }
            None => {
                debug!("No existing folders in {}", library_dir.display());
                Ok(None)
            }
        }
    }

    /// The matched folder, or where a new one for `title` should go
    pub async fn get_or_create_folder(&self, title: &str, library_dir: &Path) -> Result<PathBuf> {
        if let Some(existing) = self.find_match(title, library_dir).await? {
            return Ok(existing);
        }
        Ok(library_dir.join(sanitize_folder_name(title)))
    }
}

/// Drop filesystem-hostile characters, collapse whitespace, trim dots and spaces
pub fn sanitize_folder_name(name: &str) -> String {
    let kept: String = name.chars().filter(|c| !INVALID_CHARS.contains(c)).collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c| c == '.' || c == ' ')
        .to_string()
}
