//! Per-run statistics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{error, info};
use uuid::Uuid;

use crate::verdict::{BatchDecision, StabilityVerdict};

/// What happened to the queue in one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    pub run_id: Uuid,
    pub start_time: SystemTime,
    pub duration: Duration,
    pub dry_run: bool,
    /// Candidates found in the download directory
    pub candidates: usize,
    pub stable: usize,
    pub unstable: usize,
    /// Stable items that went through the route-and-move stage
    pub processed: usize,
    pub moved: usize,
    /// Candidates left in place this run, whatever the reason
    pub skipped: usize,
    pub errors: usize,
    /// Moved items also removed from the remote store
    pub remote_deleted: usize,
    pub remote_failed: usize,
    /// Not-stable verdicts keyed by reason
    pub reasons: BTreeMap<String, usize>,
    pub failures: Vec<String>,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new(false)
    }
}

impl RunStats {
    pub fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            start_time: SystemTime::now(),
            duration: Duration::default(),
            dry_run,
            candidates: 0,
            stable: 0,
            unstable: 0,
            processed: 0,
            moved: 0,
            skipped: 0,
            errors: 0,
            remote_deleted: 0,
            remote_failed: 0,
            reasons: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn record_decision(&mut self, decision: &BatchDecision) {
        self.candidates += decision.verdicts.len();
        for v in &decision.verdicts {
            match v.verdict {
                StabilityVerdict::Stable => self.stable += 1,
                StabilityVerdict::Unstable(_) => {
                    self.unstable += 1;
                    self.skipped += 1;
                }
                StabilityVerdict::Skipped(_) => self.skipped += 1,
            }
            if let Some(reason) = v.verdict.reason() {
                *self.reasons.entry(reason.to_string()).or_insert(0) += 1;
            }
        }
    }

    pub fn record_move(&mut self) {
        self.processed += 1;
        self.moved += 1;
    }

    pub fn record_error(&mut self, path: &Path, message: impl Into<String>) {
        let message = message.into();
        error!(path = %path.display(), message = %message, "Failed to process item");
        self.processed += 1;
        self.errors += 1;
        self.failures.push(format!("{}: {}", path.display(), message));
    }

    pub fn record_remote_cleanup(&mut self, success: bool) {
        if success {
            self.remote_deleted += 1;
        } else {
            self.remote_failed += 1;
        }
    }

    pub fn complete(&mut self) {
        self.duration = SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default();

        info!(
            run_id = %self.run_id,
            duration_secs = self.duration.as_secs_f64(),
            candidates = self.candidates,
            stable = self.stable,
            moved = self.moved,
            skipped = self.skipped,
            errors = self.errors,
            dry_run = self.dry_run,
            "Run completed"
        );
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    /// 1 when any stable item failed to move
    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }

    pub fn summary(&self) -> String {
        let prefix = if self.dry_run { "DRY RUN: " } else { "" };
        let mut summary = format!(
            "{}Processed {} item(s) in {:.2}s: {} moved, {} skipped, {} error(s)",
            prefix,
            self.processed,
            self.duration.as_secs_f64(),
            self.moved,
            self.skipped,
            self.errors
        );
        if self.remote_deleted + self.remote_failed > 0 {
            summary.push_str(&format!(
                "; SFTP: {} deleted, {} failed",
                self.remote_deleted, self.remote_failed
            ));
        }
        summary
    }
}
