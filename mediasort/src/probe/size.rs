//! Size stability sampling over a whole batch
//!
//! One sampling window is shared by every candidate in the batch: the probe
//! takes a baseline snapshot of every file, then sleeps and re-samples the
//! files of candidates that have not changed yet. Total wall time is about
//! `(retries - 1) * interval` no matter how many candidates there are.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::{Result, StabilityError};

/// Lowest sample count that can observe a change
pub const MIN_RETRIES: u32 = 2;

/// File sizes keyed by path
pub type SizeSnapshot = HashMap<PathBuf, u64>;

/// The files that belong to one candidate
#[derive(Debug, Clone)]
pub struct CandidateFiles {
    pub candidate: PathBuf,
    pub files: Vec<PathBuf>,
}

/// First size change seen for a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeChange {
    pub candidate: PathBuf,
    pub file: PathBuf,
    pub before: u64,
    pub after: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SizeStabilityReport {
    /// Candidates that changed, in discovery order
    pub changed: Vec<SizeChange>,
    /// Most recent size of every file that was sampled
    pub final_sizes: SizeSnapshot,
    /// Number of snapshots taken, baseline included
    pub samples: u32,
}

impl SizeStabilityReport {
    pub fn changed_candidate(&self, candidate: &Path) -> Option<&SizeChange> {
        self.changed.iter().find(|c| c.candidate == candidate)
    }
}

pub struct SizeStabilityProbe {
    interval: Duration,
    retries: u32,
}

impl SizeStabilityProbe {
    /// `retries` below two is raised to two.
    pub fn new(interval: Duration, retries: u32) -> Self {
        Self {
            interval,
            retries: retries.max(MIN_RETRIES),
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Sample every candidate's files across one shared window.
    ///
    /// Fails with [`StabilityError::FileVanished`] if any file can no longer
    /// be stat'ed; the caller decides what that means for the batch.
    pub async fn check(&self, batch: &[CandidateFiles]) -> Result<SizeStabilityReport> {
        let mut report = SizeStabilityReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let all_files: Vec<&Path> = batch
            .iter()
            .flat_map(|c| c.files.iter().map(PathBuf::as_path))
            .collect();
        let mut previous = snapshot(all_files).await?;
        report.samples = 1;

        let mut active: Vec<&CandidateFiles> = batch.iter().collect();

        for round in 1..self.retries {
            if active.is_empty() {
                break;
            }

            tokio::time::sleep(self.interval).await;

            let files: Vec<&Path> = active
                .iter()
                .flat_map(|c| c.files.iter().map(PathBuf::as_path))
                .collect();
            let current = snapshot(files).await?;
            report.samples += 1;

            active.retain(|candidate| match first_change(candidate, &previous, &current) {
                Some(change) => {
                    debug!(
                        "Round {}: '{}' changed size ({} -> {})",
                        round,
                        change.file.display(),
                        change.before,
                        change.after
                    );
                    report.changed.push(change);
                    false
                }
                None => true,
            });

            previous.extend(current);
        }

        report.final_sizes = previous;
        Ok(report)
    }
}

fn first_change(candidate: &CandidateFiles, previous: &SizeSnapshot, current: &SizeSnapshot) -> Option<SizeChange> {
    candidate.files.iter().find_map(|file| {
        let before = previous.get(file).copied()?;
        let after = current.get(file).copied()?;
        (before != after).then(|| SizeChange {
            candidate: candidate.candidate.clone(),
            file: file.clone(),
            before,
            after,
        })
    })
}

/// Stat every file once
pub async fn snapshot<'a>(files: impl IntoIterator<Item = &'a Path>) -> Result<SizeSnapshot> {
    let mut sizes = SizeSnapshot::new();
    for file in files {
        if sizes.contains_key(file) {
            continue;
        }
        let metadata = fs::metadata(file)
            .await
            .map_err(|e| StabilityError::from_io(file, e))?;
        sizes.insert(file.to_path_buf(), metadata.len());
    }
    Ok(sizes)
}
