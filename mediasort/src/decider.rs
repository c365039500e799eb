//! Batch transfer-completion decisions
//!
//! [`TransferCompletionDecider::decide`] runs every candidate through the
//! probes in a fixed order and short-circuits on the first negative signal:
//!
//! 1. remote job incomplete
//! 2. sync temp marker present
//! 3. sync API still needs files
//! 4. file collection (an empty directory is stable)
//! 5. size stability, one shared window for the whole batch
//! 6. content hash, for candidates the sync API does not track
//! 7. zero-byte files
//!
//! Whatever survives is stable.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, StabilityError};
use crate::events::{DecisionEvent, DecisionEventKind, EventLog, ProbeKind};
use crate::probe::hash::{DEFAULT_FULL_HASH_THRESHOLD, DEFAULT_SAMPLE_SIZE};
use crate::probe::temp_file::DEFAULT_TEMP_PATTERNS;
use crate::probe::{
    CandidateFiles, ContentHashProbe, RemoteJobProbe, SizeStabilityProbe, SyncApiProbe,
    TempFileProbe,
};
use crate::scanner::collect_files;
use crate::verdict::{BatchDecision, CandidateVerdict, StabilityVerdict, VerdictReason};

/// Tunables for the filesystem probes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeciderOptions {
    /// Wait between size samples
    pub stability_interval: Duration,
    /// Number of size samples, baseline included (at least 2)
    pub stability_retries: u32,
    pub allow_zero_byte_files: bool,
    /// Fingerprint files the sync API does not track
    pub hash_untracked: bool,
    pub full_hash_threshold: u64,
    pub hash_sample_size: u64,
    pub temp_patterns: Vec<String>,
}

impl Default for DeciderOptions {
    fn default() -> Self {
        Self {
            stability_interval: Duration::from_secs(5),
            stability_retries: 2,
            allow_zero_byte_files: false,
            hash_untracked: true,
            full_hash_threshold: DEFAULT_FULL_HASH_THRESHOLD,
            hash_sample_size: DEFAULT_SAMPLE_SIZE,
            temp_patterns: DEFAULT_TEMP_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A candidate that reached the size window
struct InFlight {
    index: usize,
    files: CandidateFiles,
    tracked: bool,
}

pub struct TransferCompletionDecider {
    options: DeciderOptions,
    remote_jobs: RemoteJobProbe,
    temp_files: TempFileProbe,
    sync_api: Option<SyncApiProbe>,
    size_probe: SizeStabilityProbe,
    hash_probe: Option<ContentHashProbe>,
    events: EventLog,
}

impl TransferCompletionDecider {
    /// A decider with both integrations disabled
    pub fn new(options: DeciderOptions) -> Result<Self> {
        let temp_files = TempFileProbe::new(&options.temp_patterns)?;
        let size_probe = SizeStabilityProbe::new(options.stability_interval, options.stability_retries);
        let hash_probe = options
            .hash_untracked
            .then(|| ContentHashProbe::new(options.full_hash_threshold, options.hash_sample_size));

        Ok(Self {
            options,
            remote_jobs: RemoteJobProbe::disabled(),
            temp_files,
            sync_api: None,
            size_probe,
            hash_probe,
            events: EventLog::new(),
        })
    }

    pub fn with_remote_jobs(mut self, probe: RemoteJobProbe) -> Self {
        self.remote_jobs = probe;
        self
    }

    pub fn with_sync_api(mut self, probe: SyncApiProbe) -> Self {
        self.sync_api = Some(probe);
        self
    }

    pub fn options(&self) -> &DeciderOptions {
        &self.options
    }

    pub fn has_remote_jobs(&self) -> bool {
        self.remote_jobs.is_enabled()
    }

    pub fn has_sync_api(&self) -> bool {
        self.sync_api.is_some()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Move the recorded events out
    pub fn take_events(&mut self) -> Vec<DecisionEvent> {
        self.events.take()
    }

    /// Drop cached integration state
    pub fn reset_caches(&mut self) {
        self.remote_jobs.clear();
        if let Some(api) = &mut self.sync_api {
            api.reset();
        }
    }

    /// Decide every candidate in one batch. Verdicts keep candidate order.
    pub async fn decide(&mut self, candidates: &[PathBuf]) -> Result<BatchDecision> {
        self.events.push(DecisionEventKind::BatchStarted {
            candidates: candidates.len(),
        });

        let mut verdicts: Vec<Option<StabilityVerdict>> = vec![None; candidates.len()];
        if candidates.is_empty() {
            return Ok(self.finish(candidates, verdicts));
        }

        if self.remote_jobs.is_enabled() && !self.remote_jobs.refresh().await {
            self.events
                .warning("Remote job list unavailable, skipping remote job checks this batch");
        }

        let mut in_flight = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(verdict) = self.pre_screen(index, candidate, &mut in_flight).await? {
                verdicts[index] = Some(verdict);
            }
        }

        if !in_flight.is_empty() {
            self.settle(&in_flight, &mut verdicts).await?;
        }

        Ok(self.finish(candidates, verdicts))
    }

    /// Steps 1 to 4 for one candidate. `None` means it joined the size window.
    async fn pre_screen(
        &mut self,
        index: usize,
        candidate: &Path,
        in_flight: &mut Vec<InFlight>,
    ) -> Result<Option<StabilityVerdict>> {
        self.events.push(DecisionEventKind::Discovered {
            path: candidate.to_path_buf(),
        });

        let Ok(meta) = tokio::fs::symlink_metadata(candidate).await else {
            self.events
                .probe(candidate, ProbeKind::FileCollection, "candidate no longer exists");
            return Ok(Some(StabilityVerdict::Skipped(VerdictReason::FileDisappeared)));
        };
        let is_dir = meta.is_dir();

        let name = candidate
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let job = self.remote_jobs.check(&name).await;
        let signal = job.signal();
        self.events.probe(candidate, ProbeKind::RemoteJob, signal.detail());
        if signal.is_pending() {
            return Ok(Some(StabilityVerdict::Unstable(VerdictReason::RemoteJobIncomplete)));
        }

        if let Some(marker) = self.temp_files.find_marker(candidate, is_dir).await? {
            let marker_name = marker
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.events.probe(
                candidate,
                ProbeKind::TempFile,
                format!("found temp file '{}'", marker_name),
            );
            return Ok(Some(StabilityVerdict::Unstable(VerdictReason::SyncTempFilePresent)));
        }
        self.events
            .probe(candidate, ProbeKind::TempFile, "no temp files found");

        let mut tracked = false;
        if let Some(api) = &mut self.sync_api {
            let status = api.check(candidate, is_dir).await;
            let signal = status.signal();
            self.events.probe(candidate, ProbeKind::SyncApi, signal.detail());
            if signal.is_pending() {
                return Ok(Some(StabilityVerdict::Unstable(VerdictReason::ActivelySyncingViaApi)));
            }
            tracked = status.is_tracked();
        }

        let files = match collect_files(candidate) {
            Ok(files) => files,
            Err(e) if e.is_vanished() => {
                self.events
                    .probe(candidate, ProbeKind::FileCollection, "disappeared while listing files");
                return Ok(Some(StabilityVerdict::Skipped(VerdictReason::FileDisappeared)));
            }
            Err(e) => return Err(e),
        };

        if files.is_empty() {
            self.events
                .probe(candidate, ProbeKind::FileCollection, "empty directory");
            return Ok(Some(StabilityVerdict::Stable));
        }

        self.events.probe(
            candidate,
            ProbeKind::FileCollection,
            format!("{} file(s) to watch", files.len()),
        );
        in_flight.push(InFlight {
            index,
            files: CandidateFiles {
                candidate: candidate.to_path_buf(),
                files,
            },
            tracked,
        });
        Ok(None)
    }

    /// Steps 5 to 8 across every candidate that reached the size window
    async fn settle(&mut self, in_flight: &[InFlight], verdicts: &mut [Option<StabilityVerdict>]) -> Result<()> {
        let untracked_files: Vec<PathBuf> = in_flight
            .iter()
            .filter(|c| !c.tracked)
            .flat_map(|c| c.files.files.iter().cloned())
            .collect();

        let hashed = match &self.hash_probe {
            Some(hash) if !untracked_files.is_empty() => Some(hash.fingerprint(&untracked_files).await),
            _ => None,
        };
        let before = match hashed {
            Some(Ok(fingerprint)) => Some(fingerprint),
            Some(Err(e)) => return self.abort_window(e, in_flight, verdicts),
            None => None,
        };

        let batch: Vec<CandidateFiles> = in_flight.iter().map(|c| c.files.clone()).collect();
        self.events.note(format!(
            "Sampling sizes of {} item(s): {} sample(s) {:?} apart",
            batch.len(),
            self.size_probe.retries(),
            self.options.stability_interval
        ));
        let report = match self.size_probe.check(&batch).await {
            Ok(report) => report,
            Err(e) => return self.abort_window(e, in_flight, verdicts),
        };

        let mut survivors = Vec::new();
        for candidate in in_flight {
            let path = &candidate.files.candidate;
            match report.changed_candidate(path) {
                Some(change) => {
                    self.events.probe(
                        path,
                        ProbeKind::SizeStability,
                        format!(
                            "'{}' changed size ({} -> {} bytes)",
                            change.file.display(),
                            change.before,
                            change.after
                        ),
                    );
                    verdicts[candidate.index] = Some(StabilityVerdict::Unstable(VerdictReason::SizeChanged));
                }
                None => {
                    self.events
                        .probe(path, ProbeKind::SizeStability, "size unchanged");
                    survivors.push(candidate);
                }
            }
        }

        if let Some(before) = before {
            let to_rehash: Vec<PathBuf> = survivors
                .iter()
                .filter(|c| !c.tracked)
                .flat_map(|c| c.files.files.iter().cloned())
                .collect();

            let rehashed = match &self.hash_probe {
                Some(hash) if !to_rehash.is_empty() => Some(hash.fingerprint(&to_rehash).await),
                _ => None,
            };

            if let Some(rehashed) = rehashed {
                let after = match rehashed {
                    Ok(after) => after,
                    Err(e) => return self.abort_survivors(e, &survivors, verdicts),
                };
                let sampled: HashSet<&Path> = to_rehash.iter().map(PathBuf::as_path).collect();
                let changed: HashSet<&Path> = ContentHashProbe::changed_files(&before, &after)
                    .into_iter()
                    .filter(|p| sampled.contains(p))
                    .collect();

                survivors.retain(|candidate| {
                    if candidate.tracked {
                        return true;
                    }
                    let path = &candidate.files.candidate;
                    match candidate.files.files.iter().find(|f| changed.contains(f.as_path())) {
                        Some(file) => {
                            self.events.probe(
                                path,
                                ProbeKind::ContentHash,
                                format!("'{}' content changed at the same size", file.display()),
                            );
                            verdicts[candidate.index] =
                                Some(StabilityVerdict::Unstable(VerdictReason::HashChanged));
                            false
                        }
                        None => {
                            self.events
                                .probe(path, ProbeKind::ContentHash, "content unchanged");
                            true
                        }
                    }
                });
            }
        }

        for candidate in survivors {
            let path = &candidate.files.candidate;
            let zero_byte = candidate
                .files
                .files
                .iter()
                .find(|f| report.final_sizes.get(*f).copied() == Some(0));

            match zero_byte {
                Some(file) if !self.options.allow_zero_byte_files => {
                    self.events.probe(
                        path,
                        ProbeKind::ZeroByte,
                        format!("'{}' is empty", file.display()),
                    );
                    verdicts[candidate.index] = Some(StabilityVerdict::Unstable(VerdictReason::ZeroByteFile));
                }
                _ => verdicts[candidate.index] = Some(StabilityVerdict::Stable),
            }
        }

        Ok(())
    }

    /// A file vanished during the shared window; nothing in it can be judged
    fn abort_window(
        &mut self,
        error: StabilityError,
        in_flight: &[InFlight],
        verdicts: &mut [Option<StabilityVerdict>],
    ) -> Result<()> {
        let all: Vec<&InFlight> = in_flight.iter().collect();
        self.abort_survivors(error, &all, verdicts)
    }

    fn abort_survivors(
        &mut self,
        error: StabilityError,
        remaining: &[&InFlight],
        verdicts: &mut [Option<StabilityVerdict>],
    ) -> Result<()> {
        if !error.is_vanished() {
            return Err(error);
        }
        self.events.warning(format!(
            "{}; skipping {} item(s) until the next run",
            error,
            remaining.len()
        ));
        for candidate in remaining {
            verdicts[candidate.index] = Some(StabilityVerdict::Skipped(VerdictReason::FileDisappeared));
        }
        Ok(())
    }

    fn finish(&mut self, candidates: &[PathBuf], verdicts: Vec<Option<StabilityVerdict>>) -> BatchDecision {
        let verdicts: Vec<CandidateVerdict> = candidates
            .iter()
            .zip(verdicts)
            .map(|(path, verdict)| {
                let verdict = verdict.unwrap_or(StabilityVerdict::Skipped(VerdictReason::FileDisappeared));
                self.events.push(DecisionEventKind::Verdict {
                    path: path.clone(),
                    verdict,
                });
                CandidateVerdict {
                    path: path.clone(),
                    verdict,
                }
            })
            .collect();

        let decision = BatchDecision { verdicts };
        let stable = decision.count_where(StabilityVerdict::is_stable);
        self.events.push(DecisionEventKind::BatchCompleted {
            stable,
            not_stable: decision.verdicts.len() - stable,
        });
        debug!("Batch decided: {} stable of {}", stable, decision.verdicts.len());
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::fakes::{folder, job, FakeJobs, FakeSync};
    use crate::probe::PathMapping;
    use mediasort_api::{NeedEntry, NeedResponse};
    use tempfile::TempDir;
    use tokio::fs;

    fn fast_options() -> DeciderOptions {
        DeciderOptions {
            stability_interval: Duration::from_millis(20),
            stability_retries: 2,
            ..Default::default()
        }
    }

    fn decider() -> TransferCompletionDecider {
        TransferCompletionDecider::new(fast_options()).unwrap()
    }

    async fn write(path: &Path, data: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.unwrap();
        }
        fs::write(path, data).await.unwrap();
    }

    fn verdict(decision: &BatchDecision, path: &Path) -> StabilityVerdict {
        decision.verdict_for(path).unwrap()
    }

    fn probed(decider: &TransferCompletionDecider, kind: ProbeKind) -> bool {
        decider
            .events()
            .events()
            .iter()
            .any(|e| matches!(&e.kind, DecisionEventKind::Probe { probe, .. } if *probe == kind))
    }

    #[tokio::test]
    async fn test_settled_file_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let movie = temp_dir.path().join("Movie.2020.mkv");
        write(&movie, &[1u8; 4096]).await;

        let decision = decider().decide(&[movie.clone()]).await.unwrap();
        assert_eq!(verdict(&decision, &movie), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_incomplete_remote_job_short_circuits() {
        let temp_dir = TempDir::new().unwrap();
        let show = temp_dir.path().join("Show.S01");
        write(&show.join("e01.mkv"), b"video").await;

        let jobs = FakeJobs {
            jobs: vec![job("H", "/seed/TV_Shows/Show.S01", 100, 40)],
            ..Default::default()
        };
        let mut decider = decider().with_remote_jobs(RemoteJobProbe::new(
            Box::new(jobs),
            "/seed",
            vec!["TV_Shows".to_string()],
        ));

        let decision = decider.decide(&[show.clone()]).await.unwrap();
        assert_eq!(
            verdict(&decision, &show),
            StabilityVerdict::Unstable(VerdictReason::RemoteJobIncomplete)
        );
        assert!(probed(&decider, ProbeKind::RemoteJob));
        assert!(!probed(&decider, ProbeKind::TempFile));
        assert!(!probed(&decider, ProbeKind::SizeStability));
    }

    #[tokio::test]
    async fn test_temp_marker_beats_everything_else() {
        let temp_dir = TempDir::new().unwrap();
        let show = temp_dir.path().join("Show.S01");
        write(&show.join("e01.mkv"), b"video").await;
        write(&show.join(".syncthing.e02.mkv.tmp"), b"part").await;

        // Remote job says complete, sync API would say synced
        let jobs = FakeJobs {
            jobs: vec![job("H", "/seed/TV_Shows/Show.S01", 10, 10)],
            ..Default::default()
        };
        let root = fs::canonicalize(temp_dir.path()).await.unwrap();
        let sync = FakeSync {
            folders: vec![folder("media", root.to_str().unwrap())],
            ..Default::default()
        };
        let mut decider = decider()
            .with_remote_jobs(RemoteJobProbe::new(Box::new(jobs), "/seed", vec!["TV_Shows".to_string()]))
            .with_sync_api(SyncApiProbe::new(Box::new(sync), PathMapping::default()));

        let decision = decider.decide(&[show.clone()]).await.unwrap();
        assert_eq!(
            verdict(&decision, &show),
            StabilityVerdict::Unstable(VerdictReason::SyncTempFilePresent)
        );
    }

    #[tokio::test]
    async fn test_queued_subtitle_keeps_season_pack_unstable() {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).await.unwrap();
        let show = root.join("Show.S01");
        write(&show.join("e01.mkv"), b"video").await;

        let mut sync = FakeSync {
            folders: vec![folder("media", root.to_str().unwrap())],
            ..Default::default()
        };
        sync.need.insert(
            "media".to_string(),
            NeedResponse {
                queued: vec![NeedEntry {
                    name: "Show.S01/e01.srt".to_string(),
                    size: 20,
                    kind: None,
                }],
                ..Default::default()
            },
        );
        let mut decider = decider().with_sync_api(SyncApiProbe::new(Box::new(sync), PathMapping::default()));

        let decision = decider.decide(&[show.clone()]).await.unwrap();
        assert_eq!(
            verdict(&decision, &show),
            StabilityVerdict::Unstable(VerdictReason::ActivelySyncingViaApi)
        );
    }

    #[tokio::test]
    async fn test_growing_file_is_unstable() {
        let temp_dir = TempDir::new().unwrap();
        let growing = temp_dir.path().join("Growing.mkv");
        let settled = temp_dir.path().join("Settled.mkv");
        write(&growing, b"1").await;
        write(&settled, b"1").await;

        let writer_path = growing.clone();
        let writer = tokio::spawn(async move {
            for i in 0..30u8 {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let mut data = fs::read(&writer_path).await.unwrap();
                data.push(i);
                fs::write(&writer_path, data).await.unwrap();
            }
        });

        let mut decider = TransferCompletionDecider::new(DeciderOptions {
            stability_interval: Duration::from_millis(100),
            ..fast_options()
        })
        .unwrap();
        let decision = decider.decide(&[growing.clone(), settled.clone()]).await.unwrap();
        writer.await.unwrap();

        assert_eq!(
            verdict(&decision, &growing),
            StabilityVerdict::Unstable(VerdictReason::SizeChanged)
        );
        assert_eq!(verdict(&decision, &settled), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_same_size_rewrite_is_hash_changed() {
        let temp_dir = TempDir::new().unwrap();
        let movie = temp_dir.path().join("Movie.mkv");
        write(&movie, b"aaaaaaaa").await;

        let rewriter_path = movie.clone();
        let rewriter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fs::write(&rewriter_path, b"bbbbbbbb").await.unwrap();
        });

        let mut decider = TransferCompletionDecider::new(DeciderOptions {
            stability_interval: Duration::from_millis(150),
            ..fast_options()
        })
        .unwrap();
        let decision = decider.decide(&[movie.clone()]).await.unwrap();
        rewriter.await.unwrap();

        assert_eq!(
            verdict(&decision, &movie),
            StabilityVerdict::Unstable(VerdictReason::HashChanged)
        );
    }

    #[tokio::test]
    async fn test_tracked_candidates_skip_hashing() {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).await.unwrap();
        let movie = root.join("Movie.mkv");
        write(&movie, b"aaaaaaaa").await;

        let rewriter_path = movie.clone();
        let rewriter = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fs::write(&rewriter_path, b"bbbbbbbb").await.unwrap();
        });

        let sync = FakeSync {
            folders: vec![folder("media", root.to_str().unwrap())],
            ..Default::default()
        };
        let mut decider = TransferCompletionDecider::new(DeciderOptions {
            stability_interval: Duration::from_millis(150),
            ..fast_options()
        })
        .unwrap()
        .with_sync_api(SyncApiProbe::new(Box::new(sync), PathMapping::default()));

        let decision = decider.decide(&[movie.clone()]).await.unwrap();
        rewriter.await.unwrap();
        assert_eq!(verdict(&decision, &movie), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_vanished_file_skips_window() {
        let temp_dir = TempDir::new().unwrap();
        let doomed = temp_dir.path().join("Doomed.mkv");
        let other = temp_dir.path().join("Other.mkv");
        write(&doomed, b"data").await;
        write(&other, b"data").await;

        let remover_path = doomed.clone();
        let remover = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fs::remove_file(&remover_path).await.unwrap();
        });

        let mut decider = TransferCompletionDecider::new(DeciderOptions {
            stability_interval: Duration::from_millis(150),
            hash_untracked: false,
            ..fast_options()
        })
        .unwrap();
        let decision = decider.decide(&[doomed.clone(), other.clone()]).await.unwrap();
        remover.await.unwrap();

        for path in [&doomed, &other] {
            assert_eq!(
                verdict(&decision, path),
                StabilityVerdict::Skipped(VerdictReason::FileDisappeared)
            );
        }
        assert!(decider
            .events()
            .events()
            .iter()
            .any(|e| matches!(e.kind, DecisionEventKind::Warning { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_directory_swapped_for_file_skips_window() {
        let temp_dir = TempDir::new().unwrap();
        let show = temp_dir.path().join("Show.S01");
        let other = temp_dir.path().join("Other.mkv");
        write(&show.join("Sub/e01.mkv"), b"video").await;
        write(&other, b"data").await;

        let sub = show.join("Sub");
        let swapper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            fs::remove_dir_all(&sub).await.unwrap();
            fs::write(&sub, b"not a directory").await.unwrap();
        });

        let mut decider = TransferCompletionDecider::new(DeciderOptions {
            stability_interval: Duration::from_millis(150),
            hash_untracked: false,
            ..fast_options()
        })
        .unwrap();
        let decision = decider.decide(&[show.clone(), other.clone()]).await.unwrap();
        swapper.await.unwrap();

        for path in [&show, &other] {
            assert_eq!(
                verdict(&decision, path),
                StabilityVerdict::Skipped(VerdictReason::FileDisappeared)
            );
        }
    }

    #[tokio::test]
    async fn test_paused_sync_folder_falls_through_to_size_check() {
        let temp_dir = TempDir::new().unwrap();
        let root = fs::canonicalize(temp_dir.path()).await.unwrap();
        let movie = root.join("Movie.mkv");
        write(&movie, b"settled").await;

        let sync = FakeSync {
            folders: vec![folder("media", root.to_str().unwrap())],
            need_not_found: true,
            ..Default::default()
        };
        let mut decider = decider().with_sync_api(SyncApiProbe::new(Box::new(sync), PathMapping::default()));

        let decision = decider.decide(&[movie.clone()]).await.unwrap();
        assert_eq!(verdict(&decision, &movie), StabilityVerdict::Stable);
        assert!(probed(&decider, ProbeKind::SyncApi));
        assert!(probed(&decider, ProbeKind::SizeStability));
        // Not tracked, so the content hash still ran
        assert!(probed(&decider, ProbeKind::ContentHash));
    }

    #[tokio::test]
    async fn test_missing_candidate_is_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("Gone.mkv");
        let decision = decider().decide(&[missing.clone()]).await.unwrap();
        assert_eq!(
            verdict(&decision, &missing),
            StabilityVerdict::Skipped(VerdictReason::FileDisappeared)
        );
    }

    #[tokio::test]
    async fn test_empty_directory_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("Empty.Show");
        fs::create_dir_all(&empty).await.unwrap();

        let decision = decider().decide(&[empty.clone()]).await.unwrap();
        assert_eq!(verdict(&decision, &empty), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_zero_byte_gate_toggle() {
        let temp_dir = TempDir::new().unwrap();
        let show = temp_dir.path().join("Show.S01");
        write(&show.join("e01.mkv"), b"video").await;
        write(&show.join("e01.nfo"), b"").await;

        let decision = decider().decide(&[show.clone()]).await.unwrap();
        assert_eq!(
            verdict(&decision, &show),
            StabilityVerdict::Unstable(VerdictReason::ZeroByteFile)
        );

        let mut tolerant = TransferCompletionDecider::new(DeciderOptions {
            allow_zero_byte_files: true,
            ..fast_options()
        })
        .unwrap();
        let decision = tolerant.decide(&[show.clone()]).await.unwrap();
        assert_eq!(verdict(&decision, &show), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_repeated_runs_agree() {
        let temp_dir = TempDir::new().unwrap();
        let movie = temp_dir.path().join("Movie.mkv");
        write(&movie, b"settled").await;

        let first = decider().decide(&[movie.clone()]).await.unwrap();
        let second = decider().decide(&[movie.clone()]).await.unwrap();
        assert_eq!(verdict(&first, &movie), StabilityVerdict::Stable);
        assert_eq!(verdict(&second, &movie), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_broken_remote_jobs_fail_open() {
        let temp_dir = TempDir::new().unwrap();
        let movie = temp_dir.path().join("Movie.mkv");
        write(&movie, b"settled").await;

        let baseline = decider().decide(&[movie.clone()]).await.unwrap();

        let broken = FakeJobs {
            fail: true,
            ..Default::default()
        };
        let mut decider = decider().with_remote_jobs(RemoteJobProbe::new(Box::new(broken), "/seed", vec![]));
        let decision = decider.decide(&[movie.clone()]).await.unwrap();

        assert_eq!(verdict(&baseline, &movie), StabilityVerdict::Stable);
        assert_eq!(verdict(&decision, &movie), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_unreachable_sync_api_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let movie = temp_dir.path().join("Movie.mkv");
        write(&movie, b"settled").await;

        let sync = FakeSync {
            ping_fails: true,
            ..Default::default()
        };
        let mut decider = decider().with_sync_api(SyncApiProbe::new(Box::new(sync), PathMapping::default()));
        let decision = decider.decide(&[movie.clone()]).await.unwrap();
        assert_eq!(verdict(&decision, &movie), StabilityVerdict::Stable);
    }

    #[tokio::test]
    async fn test_verdicts_keep_candidate_order_and_events() {
        let temp_dir = TempDir::new().unwrap();
        let b = temp_dir.path().join("B.mkv");
        let a = temp_dir.path().join("A.mkv");
        write(&b, b"b").await;
        write(&a, b"a").await;

        let mut decider = decider();
        let decision = decider.decide(&[b.clone(), a.clone()]).await.unwrap();
        let order: Vec<&Path> = decision.verdicts.iter().map(|v| v.path.as_path()).collect();
        assert_eq!(order, vec![b.as_path(), a.as_path()]);

        let events = decider.take_events();
        assert!(matches!(events.first().map(|e| &e.kind), Some(DecisionEventKind::BatchStarted { candidates: 2 })));
        assert!(matches!(
            events.last().map(|e| &e.kind),
            Some(DecisionEventKind::BatchCompleted { stable: 2, not_stable: 0 })
        ));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let decision = decider().decide(&[]).await.unwrap();
        assert!(decision.verdicts.is_empty());
    }

    mod growth {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(8))]

            #[test]
            fn growing_file_never_stable(initial in 1usize..2048, growth in 1usize..2048) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap();

                let stable = runtime.block_on(async {
                    let temp_dir = TempDir::new().unwrap();
                    let file = temp_dir.path().join("Grow.mkv");
                    fs::write(&file, vec![0u8; initial]).await.unwrap();

                    let grower = file.clone();
                    let handle = tokio::spawn(async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        fs::write(&grower, vec![0u8; initial + growth]).await.unwrap();
                    });

                    let mut decider = TransferCompletionDecider::new(DeciderOptions {
                        stability_interval: Duration::from_millis(120),
                        ..fast_options()
                    })
                    .unwrap();
                    let decision = decider.decide(&[file.clone()]).await.unwrap();
                    handle.await.unwrap();
                    decision.verdict_for(&file).map(|v| v.is_stable())
                });

                prop_assert_eq!(stable, Some(false));
            }
        }
    }
}
