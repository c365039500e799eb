//! Per-candidate stability verdicts

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Why a candidate was not judged stable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictReason {
    RemoteJobIncomplete,
    SyncTempFilePresent,
    ActivelySyncingViaApi,
    SizeChanged,
    HashChanged,
    ZeroByteFile,
    FileDisappeared,
}

impl VerdictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictReason::RemoteJobIncomplete => "remote-job-incomplete",
            VerdictReason::SyncTempFilePresent => "sync-temp-file-present",
            VerdictReason::ActivelySyncingViaApi => "actively-syncing-via-api",
            VerdictReason::SizeChanged => "size-changed",
            VerdictReason::HashChanged => "hash-changed",
            VerdictReason::ZeroByteFile => "zero-byte-file",
            VerdictReason::FileDisappeared => "file-disappeared",
        }
    }
}

impl fmt::Display for VerdictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum StabilityVerdict {
    /// Safe to hand to the move executor
    Stable,
    /// A probe saw the transfer still in flight
    Unstable(VerdictReason),
    /// The batch could not be resolved for this candidate
    Skipped(VerdictReason),
}

impl StabilityVerdict {
    pub fn is_stable(&self) -> bool {
        matches!(self, StabilityVerdict::Stable)
    }

    pub fn reason(&self) -> Option<VerdictReason> {
        match self {
            StabilityVerdict::Stable => None,
            StabilityVerdict::Unstable(reason) | StabilityVerdict::Skipped(reason) => Some(*reason),
        }
    }
}

impl fmt::Display for StabilityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StabilityVerdict::Stable => write!(f, "STABLE"),
            StabilityVerdict::Unstable(reason) => write!(f, "UNSTABLE({})", reason),
            StabilityVerdict::Skipped(reason) => write!(f, "SKIPPED({})", reason),
        }
    }
}

/// Verdict for one candidate path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateVerdict {
    pub path: PathBuf,
    pub verdict: StabilityVerdict,
}

/// Outcome of one decider batch, in candidate order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchDecision {
    pub verdicts: Vec<CandidateVerdict>,
}

impl BatchDecision {
    /// Candidates the move executor may touch
    pub fn stable(&self) -> Vec<PathBuf> {
        self.verdicts
            .iter()
            .filter(|v| v.verdict.is_stable())
            .map(|v| v.path.clone())
            .collect()
    }

    pub fn verdict_for(&self, path: &Path) -> Option<StabilityVerdict> {
        self.verdicts
            .iter()
            .find(|v| v.path == path)
            .map(|v| v.verdict)
    }

    pub fn count_where(&self, predicate: impl Fn(&StabilityVerdict) -> bool) -> usize {
        self.verdicts.iter().filter(|v| predicate(&v.verdict)).count()
    }

    pub fn not_stable_count(&self) -> usize {
        self.count_where(|v| !v.is_stable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_display() {
        assert_eq!(StabilityVerdict::Stable.to_string(), "STABLE");
        assert_eq!(
            StabilityVerdict::Unstable(VerdictReason::SizeChanged).to_string(),
            "UNSTABLE(size-changed)"
        );
        assert_eq!(
            StabilityVerdict::Skipped(VerdictReason::FileDisappeared).to_string(),
            "SKIPPED(file-disappeared)"
        );
    }

    #[test]
    fn test_stable_subset_keeps_order() {
        let decision = BatchDecision {
            verdicts: vec![
                CandidateVerdict {
                    path: PathBuf::from("/dl/b"),
                    verdict: StabilityVerdict::Stable,
                },
                CandidateVerdict {
                    path: PathBuf::from("/dl/a"),
                    verdict: StabilityVerdict::Unstable(VerdictReason::HashChanged),
                },
                CandidateVerdict {
                    path: PathBuf::from("/dl/c"),
                    verdict: StabilityVerdict::Stable,
                },
            ],
        };

        assert_eq!(decision.stable(), vec![PathBuf::from("/dl/b"), PathBuf::from("/dl/c")]);
        assert_eq!(decision.not_stable_count(), 1);
        assert_eq!(
            decision.verdict_for(Path::new("/dl/a")).and_then(|v| v.reason()),
            Some(VerdictReason::HashChanged)
        );
    }

    #[test]
    fn test_reason_serializes_kebab_case() {
        let json = serde_json::to_string(&StabilityVerdict::Unstable(VerdictReason::ZeroByteFile)).unwrap();
        assert_eq!(json, r#"{"state":"unstable","reason":"zero-byte-file"}"#);
    }
}
