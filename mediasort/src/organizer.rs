//! The run pipeline: scan, decide, route and move

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::classifier::{ContentClassifier, MediaKind};
use crate::cleanup::RemoteCleanup;
use crate::decider::TransferCompletionDecider;
use crate::error::{Result, StabilityError};
use crate::matcher::{FolderMatcher, DEFAULT_THRESHOLD};
use crate::metrics::RunStats;
use crate::mover::FileMover;
use crate::parser::FilenameParser;
use crate::scanner::{QueueScanner, ScanOptions};
use crate::verdict::BatchDecision;

/// Called once, before processing, when a quiet run finds stable work
pub type WakeHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizerOptions {
    pub download_dir: PathBuf,
    pub scan_options: ScanOptions,
    /// Fuzzy folder match threshold, 0 to 100
    pub fuzzy_threshold: u8,
    pub dry_run: bool,
    /// Defer decision logging until there is stable work
    pub quiet: bool,
}

impl OrganizerOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            scan_options: ScanOptions::default(),
            fuzzy_threshold: DEFAULT_THRESHOLD,
            dry_run: false,
            quiet: false,
        }
    }
}

/// Where one stable item was routed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub source: PathBuf,
    pub kind: MediaKind,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub stats: RunStats,
    pub decision: BatchDecision,
    pub placements: Vec<Placement>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.stats.exit_code()
    }
}

pub struct MediaOrganizer {
    options: OrganizerOptions,
    scanner: QueueScanner,
    decider: TransferCompletionDecider,
    parser: FilenameParser,
    classifier: ContentClassifier,
    matcher: FolderMatcher,
    mover: FileMover,
    wake: Option<WakeHook>,
    cleanup: Option<RemoteCleanup>,
}

impl MediaOrganizer {
    pub fn new(
        options: OrganizerOptions,
        decider: TransferCompletionDecider,
        classifier: ContentClassifier,
    ) -> Result<Self> {
        Ok(Self {
            scanner: QueueScanner::new(options.scan_options.clone()),
            parser: FilenameParser::new()?,
            matcher: FolderMatcher::new(options.fuzzy_threshold),
            mover: FileMover::new(options.dry_run),
            decider,
            classifier,
            options,
            wake: None,
            cleanup: None,
        })
    }

    pub fn with_wake_hook(mut self, hook: WakeHook) -> Self {
        self.wake = Some(hook);
        self
    }

    /// Delete each item from the remote store after it has been moved
    pub fn with_remote_cleanup(mut self, cleanup: RemoteCleanup) -> Self {
        self.cleanup = Some(cleanup);
        self
    }

    pub fn options(&self) -> &OrganizerOptions {
        &self.options
    }

    /// Scan and decide without moving anything
    pub async fn check(&mut self) -> Result<BatchDecision> {
        self.decider.reset_caches();
        let queue = self.scanner.scan(&self.options.download_dir).await?;
        let decision = self.decider.decide(&queue).await?;
        self.decider.events().replay();
        self.decider.take_events();
        Ok(decision)
    }

    /// One full pass over the download directory
    pub async fn run(&mut self) -> Result<RunReport> {
        let mut stats = RunStats::new(self.options.dry_run);
        let quiet = self.options.quiet;
        self.decider.reset_caches();

        let queue = self.scanner.scan(&self.options.download_dir).await?;
        if queue.is_empty() {
            if !quiet {
                info!("No items to process");
            }
            stats.complete();
            return Ok(RunReport {
                stats,
                decision: BatchDecision::default(),
                placements: Vec::new(),
            });
        }

        if !quiet {
            info!("Found {} item(s) to process", queue.len());
        }

        let decision = self.decider.decide(&queue).await?;
        stats.record_decision(&decision);
        let stable = decision.stable();

        if quiet && !stable.is_empty() {
            if let Some(wake) = &self.wake {
                wake();
            }
        }
        if !quiet || !stable.is_empty() {
            self.decider.events().replay();
        }
        self.decider.take_events();

        let not_stable = decision.not_stable_count();
        if not_stable > 0 && (!quiet || !stable.is_empty()) {
            info!(
                "Skipping {} item(s) still transferring (will retry on next run)",
                not_stable
            );
        }

        let mut placements = Vec::new();
        if stable.is_empty() {
            if !quiet {
                info!("No stable items ready to process");
            }
        } else {
            info!("Processing {} stable item(s)...", stable.len());
            for item in &stable {
                let is_dir = tokio::fs::symlink_metadata(item)
                    .await
                    .map(|m| m.is_dir())
                    .unwrap_or(false);
                match self.process_item(item).await {
                    Ok(placement) => {
                        stats.record_move();
                        placements.push(placement);
                        if let (Some(cleanup), Some(name)) = (&self.cleanup, item.file_name()) {
                            let outcome = cleanup.remove(&name.to_string_lossy(), is_dir).await;
                            stats.record_remote_cleanup(outcome.is_success());
                        }
                    }
                    Err(e) => stats.record_error(item, e.to_string()),
                }
            }
        }

        stats.complete();
        if !quiet || !stable.is_empty() {
            info!("{}", stats.summary());
        }

        Ok(RunReport {
            stats,
            decision,
            placements,
        })
    }

    /// Parse, classify, match and move one stable item
    async fn process_item(&self, item: &Path) -> Result<Placement> {
        let name = item
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| StabilityError::path_error(item, "Item has no file name"))?;
        info!("Processing: {}", name);

        let parsed = self.parser.parse(&name);
        info!("Classified: {}", parsed);
        if parsed.title.is_empty() {
            warn!("Could not extract a title from '{}'", name);
            return Err(StabilityError::path_error(item, "No title could be parsed"));
        }

        let classification = self
            .classifier
            .classify(&parsed.title, parsed.is_tv_show, parsed.year)
            .await;
        if let Some(status) = classification.status {
            info!("Status: {}", status);
        }

        let folder = self
            .matcher
            .get_or_create_folder(&parsed.title, &classification.destination)
            .await?;
        if tokio::fs::metadata(&folder).await.is_ok() {
            info!("Matched existing folder: {}", folder.display());
        } else {
            info!("Will create new folder: {}", folder.display());
        }

        let destination = self.mover.move_item(item, &folder).await?;
        Ok(Placement {
            source: item.to_path_buf(),
            kind: classification.kind,
            destination,
        })
    }
}
