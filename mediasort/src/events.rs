//! Decision events recorded while a batch is evaluated
//!
//! The decider never prints. It appends events here, and the caller decides
//! whether to emit them right away or replay them only when a run turns out
//! to have work to do.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::verdict::StabilityVerdict;

/// Which stage produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProbeKind {
    RemoteJob,
    TempFile,
    SyncApi,
    FileCollection,
    SizeStability,
    ContentHash,
    ZeroByte,
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeKind::RemoteJob => "remote job",
            ProbeKind::TempFile => "temp file",
            ProbeKind::SyncApi => "sync API",
            ProbeKind::FileCollection => "file collection",
            ProbeKind::SizeStability => "size stability",
            ProbeKind::ContentHash => "content hash",
            ProbeKind::ZeroByte => "zero byte",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DecisionEventKind {
    /// Batch started
    BatchStarted { candidates: usize },
    /// Candidate entered the decider
    Discovered { path: PathBuf },
    /// A probe reported on a candidate
    Probe {
        path: PathBuf,
        probe: ProbeKind,
        detail: String,
    },
    /// A note about the batch as a whole
    Note { message: String },
    /// Warning about the batch as a whole
    Warning { message: String },
    /// Final verdict for a candidate
    Verdict {
        path: PathBuf,
        verdict: StabilityVerdict,
    },
    /// Batch finished
    BatchCompleted { stable: usize, not_stable: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionEvent {
    pub at: DateTime<Utc>,
    pub kind: DecisionEventKind,
}

impl fmt::Display for DecisionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DecisionEventKind::BatchStarted { candidates } => {
                write!(f, "Checking stability of {} item(s)", candidates)
            }
            DecisionEventKind::Discovered { path } => write!(f, "Discovered '{}'", display_name(path)),
            DecisionEventKind::Probe { path, probe, detail } => {
                write!(f, "[{}] '{}': {}", probe, display_name(path), detail)
            }
            DecisionEventKind::Note { message } | DecisionEventKind::Warning { message } => {
                write!(f, "{}", message)
            }
            DecisionEventKind::Verdict { path, verdict } => {
                write!(f, "'{}' -> {}", display_name(path), verdict)
            }
            DecisionEventKind::BatchCompleted { stable, not_stable } => write!(
                f,
                "Stability check complete: {} stable, {} not ready",
                stable, not_stable
            ),
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Append-only event list for one batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<DecisionEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: DecisionEventKind) {
        self.events.push(DecisionEvent { at: Utc::now(), kind });
    }

    pub fn probe(&mut self, path: &Path, probe: ProbeKind, detail: impl Into<String>) {
        self.push(DecisionEventKind::Probe {
            path: path.to_path_buf(),
            probe,
            detail: detail.into(),
        });
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.push(DecisionEventKind::Note {
            message: message.into(),
        });
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(DecisionEventKind::Warning {
            message: message.into(),
        });
    }

    pub fn events(&self) -> &[DecisionEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Move all events out, leaving the log empty
    pub fn take(&mut self) -> Vec<DecisionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Emit the recorded events through `tracing`
    pub fn replay(&self) {
        for event in &self.events {
            match event.kind {
                DecisionEventKind::Warning { .. } => warn!("{}", event),
                _ => info!("{}", event),
            }
        }
    }
}
