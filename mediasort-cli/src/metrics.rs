//! Prometheus text-file export of run results

use anyhow::{Context, Result};
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::path::Path;

use mediasort::{RunReport, StabilityVerdict};

pub struct RunMetrics {
    registry: Registry,
    pub verdicts_total: IntCounterVec,
    pub items_moved: IntCounter,
    pub move_errors: IntCounter,
    pub remote_deletions_total: IntCounterVec,
    pub run_duration_seconds: Gauge,
    pub last_run_timestamp_seconds: IntGauge,
}

impl RunMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let verdicts_total = IntCounterVec::new(
            Opts::new("mediasort_verdicts_total", "Candidates by stability verdict"),
            &["verdict", "reason"],
        )?;
        let items_moved = IntCounter::new("mediasort_items_moved_total", "Items moved into the library")?;
        let move_errors = IntCounter::new("mediasort_move_errors_total", "Stable items that failed to move")?;
        let remote_deletions_total = IntCounterVec::new(
            Opts::new("mediasort_remote_deletions_total", "Moved items removed from the seedbox"),
            &["result"],
        )?;
        let run_duration_seconds = Gauge::new("mediasort_run_duration_seconds", "Duration of the last run")?;
        let last_run_timestamp_seconds = IntGauge::new(
            "mediasort_last_run_timestamp_seconds",
            "Unix time the last run finished",
        )?;

        registry.register(Box::new(verdicts_total.clone()))?;
        registry.register(Box::new(items_moved.clone()))?;
        registry.register(Box::new(move_errors.clone()))?;
        registry.register(Box::new(remote_deletions_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(last_run_timestamp_seconds.clone()))?;

        Ok(Self {
            registry,
            verdicts_total,
            items_moved,
            move_errors,
            remote_deletions_total,
            run_duration_seconds,
            last_run_timestamp_seconds,
        })
    }

    pub fn record(&self, report: &RunReport) {
        for v in &report.decision.verdicts {
            let (verdict, reason) = match v.verdict {
                StabilityVerdict::Stable => ("stable", String::new()),
                StabilityVerdict::Unstable(r) => ("unstable", r.to_string()),
                StabilityVerdict::Skipped(r) => ("skipped", r.to_string()),
            };
            self.verdicts_total.with_label_values(&[verdict, &reason]).inc();
        }
        self.items_moved.inc_by(report.stats.moved as u64);
        self.move_errors.inc_by(report.stats.errors as u64);
        if report.stats.remote_deleted + report.stats.remote_failed > 0 {
            self.remote_deletions_total
                .with_label_values(&["deleted"])
                .inc_by(report.stats.remote_deleted as u64);
            self.remote_deletions_total
                .with_label_values(&["failed"])
                .inc_by(report.stats.remote_failed as u64);
        }
        self.run_duration_seconds.set(report.stats.duration.as_secs_f64());
        self.last_run_timestamp_seconds.set(chrono::Utc::now().timestamp());
    }

    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Write next to `path` and rename so the collector never reads a partial file
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render()?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to move metrics into {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasort::{BatchDecision, CandidateVerdict, RunStats, VerdictReason};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn report() -> RunReport {
        let decision = BatchDecision {
            verdicts: vec![
                CandidateVerdict {
                    path: PathBuf::from("/dl/a.mkv"),
                    verdict: StabilityVerdict::Stable,
                },
                CandidateVerdict {
                    path: PathBuf::from("/dl/b.mkv"),
                    verdict: StabilityVerdict::Unstable(VerdictReason::SizeChanged),
                },
            ],
        };
        let mut stats = RunStats::new(false);
        stats.record_decision(&decision);
        stats.record_move();
        RunReport {
            stats,
            decision,
            placements: Vec::new(),
        }
    }

    #[test]
    fn test_render_contains_verdicts() {
        let metrics = RunMetrics::new().unwrap();
        metrics.record(&report());
        let text = metrics.render().unwrap();
        assert!(text.contains(r#"mediasort_verdicts_total{reason="size-changed",verdict="unstable"} 1"#));
        assert!(text.contains("mediasort_items_moved_total 1"));
        assert!(!text.contains("mediasort_remote_deletions_total{"));
    }

    #[test]
    fn test_render_counts_remote_deletions() {
        let mut report = report();
        report.stats.record_remote_cleanup(true);
        report.stats.record_remote_cleanup(false);
        let metrics = RunMetrics::new().unwrap();
        metrics.record(&report);
        let text = metrics.render().unwrap();
        assert!(text.contains(r#"mediasort_remote_deletions_total{result="deleted"} 1"#));
        assert!(text.contains(r#"mediasort_remote_deletions_total{result="failed"} 1"#));
    }

    #[test]
    fn test_write_textfile() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("textfile/mediasort.prom");
        let metrics = RunMetrics::new().unwrap();
        metrics.record(&report());
        metrics.write_textfile(&path).unwrap();

        assert!(std::fs::read_to_string(&path).unwrap().contains("mediasort_move_errors_total 0"));
        assert!(!path.with_extension("prom.tmp").exists());
    }
}
