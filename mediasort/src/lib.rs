//! Media download organizer
//!
//! Decides when downloaded media has finished arriving and routes it into a
//! library:
//! - Transfer-completion decisions from filesystem and integration probes
//! - Download queue scanning
//! - Release-name parsing and movie/show classification, with airing
//!   status from TheTVDB
//! - Fuzzy matching against existing library folders
//! - Collision-safe, dry-run aware moves
//! - Optional removal of the seedbox copy over SFTP

pub mod classifier;
pub mod cleanup;
pub mod decider;
pub mod error;
pub mod events;
pub mod matcher;
pub mod metrics;
pub mod mover;
pub mod organizer;
pub mod parser;
pub mod probe;
pub mod scanner;
pub mod status;
pub mod verdict;

pub use classifier::{
    AssumeCurrent, Classification, ContentClassifier, LibraryDirs, MediaKind, ShowStatus,
    ShowStatusLookup, StaticStatusLookup,
};
pub use cleanup::{CleanupOutcome, RemoteCleanup, RemoteStore};
pub use decider::{DeciderOptions, TransferCompletionDecider};
pub use error::{Result, StabilityError};
pub use events::{DecisionEvent, DecisionEventKind, EventLog, ProbeKind};
pub use matcher::{sanitize_folder_name, FolderMatcher};
pub use metrics::RunStats;
pub use mover::FileMover;
pub use organizer::{MediaOrganizer, OrganizerOptions, Placement, RunReport, WakeHook};
pub use parser::{normalize_title, FilenameParser, ParsedMedia};
pub use probe::{
    JobSource, PathMapping, RemoteJobProbe, RemoteJobStatus, SyncApiProbe, SyncApiStatus,
    SyncSource,
};
pub use scanner::{QueueScanner, ScanOptions};
pub use status::{ProviderStatusLookup, SeriesSource, StatusCache};
pub use verdict::{BatchDecision, CandidateVerdict, StabilityVerdict, VerdictReason};

/// Decide a batch of candidates with a freshly built decider
pub async fn decide_batch(
    candidates: &[std::path::PathBuf],
    options: DeciderOptions,
) -> Result<BatchDecision> {
    let mut decider = TransferCompletionDecider::new(options)?;
    decider.decide(candidates).await
}
