//! Remote download job probe
//!
//! Fails open: when the job list is unavailable, or no job matches a
//! candidate, the candidate is treated as complete and later probes decide.

use std::collections::HashMap;
use tracing::{debug, info, warn};

use mediasort_api::RemoteJobRecord;

use super::{JobSource, Signal};

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteJobStatus {
    /// No job source configured
    Disabled,
    /// The job list could not be fetched this batch
    Unavailable(String),
    /// No job matches the candidate
    NotFound,
    Matched(RemoteJobRecord),
}

impl RemoteJobStatus {
    /// Only a matched, unfinished job counts as incomplete
    pub fn is_complete(&self) -> bool {
        match self {
            RemoteJobStatus::Matched(job) => job.is_complete(),
            _ => true,
        }
    }

    pub fn reason(&self) -> String {
        match self {
            RemoteJobStatus::Disabled => "disabled".to_string(),
            RemoteJobStatus::Unavailable(e) => format!("API unavailable, skipping check ({})", e),
            RemoteJobStatus::NotFound => "not found, treating as manually placed".to_string(),
            RemoteJobStatus::Matched(job) if job.is_complete() => {
                format!("job complete ({:.1}%)", job.progress())
            }
            RemoteJobStatus::Matched(job) => format!(
                "job incomplete: {:.1}% ({}/{} chunks)",
                job.progress(),
                job.completed_chunks,
                job.size_chunks
            ),
        }
    }

    pub fn signal(&self) -> Signal {
        match self {
            RemoteJobStatus::Matched(job) if job.is_complete() => Signal::Clear(self.reason()),
            RemoteJobStatus::Matched(_) => Signal::Pending(self.reason()),
            _ => Signal::Indeterminate(self.reason()),
        }
    }
}

/// Jobs from one refresh, indexed for lookup
#[derive(Debug, Default)]
pub struct JobIndex {
    jobs: Vec<RemoteJobRecord>,
    by_path: HashMap<String, usize>,
    by_folder: HashMap<String, usize>,
}

impl JobIndex {
    /// Build the index. When two jobs share a key the earlier one wins.
    pub fn build(jobs: Vec<RemoteJobRecord>) -> Self {
        let mut by_path = HashMap::new();
        let mut by_folder = HashMap::new();
        for (i, job) in jobs.iter().enumerate() {
            by_path.entry(normalize(&job.base_path)).or_insert(i);
            by_folder.entry(job.folder_name().to_lowercase()).or_insert(i);
        }
        Self {
            jobs,
            by_path,
            by_folder,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Exact path under each subfolder first, then the bare folder name
    pub fn find(&self, base_path: &str, subfolders: &[String], name: &str) -> Option<&RemoteJobRecord> {
        let base = base_path.trim_end_matches('/');
        for subfolder in subfolders {
            let expected = format!("{}/{}/{}", base, subfolder.trim_matches('/'), name);
            if let Some(&i) = self.by_path.get(&normalize(&expected)) {
                debug!("Matched job by path: {}", expected);
                return self.jobs.get(i);
            }
        }

        let found = self
            .by_folder
            .get(&name.to_lowercase())
            .and_then(|&i| self.jobs.get(i));
        if found.is_some() {
            debug!("Matched job by folder name: {}", name);
        }
        found
    }
}

fn normalize(path: &str) -> String {
    path.trim_end_matches('/').to_lowercase()
}

pub struct RemoteJobProbe {
    source: Option<Box<dyn JobSource>>,
    base_path: String,
    subfolders: Vec<String>,
    index: Option<std::result::Result<JobIndex, String>>,
}

impl RemoteJobProbe {
    pub fn new(source: Box<dyn JobSource>, base_path: impl Into<String>, subfolders: Vec<String>) -> Self {
        Self {
            source: Some(source),
            base_path: base_path.into(),
            subfolders,
            index: None,
        }
    }

    pub fn disabled() -> Self {
        Self {
            source: None,
            base_path: String::new(),
            subfolders: Vec::new(),
            index: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.source.is_some()
    }

    /// Fetch the full job list. Returns whether the refresh succeeded.
    pub async fn refresh(&mut self) -> bool {
        let Some(source) = &self.source else {
            return false;
        };

        let index = match source.list_jobs().await {
            Ok(jobs) => {
                info!("Remote job list refreshed: {} job(s)", jobs.len());
                Ok(JobIndex::build(jobs))
            }
            Err(e) => {
                warn!("Failed to refresh remote job list: {}", e);
                Err(e.to_string())
            }
        };
        let ok = index.is_ok();
        self.index = Some(index);
        ok
    }

    /// Drop the cached job list so the next lookup refreshes
    pub fn clear(&mut self) {
        self.index = None;
    }

    pub async fn check(&mut self, name: &str) -> RemoteJobStatus {
        if self.source.is_none() {
            return RemoteJobStatus::Disabled;
        }
        if self.index.is_none() {
            self.refresh().await;
        }

        match &self.index {
            Some(Ok(index)) => match index.find(&self.base_path, &self.subfolders, name) {
                Some(job) => RemoteJobStatus::Matched(job.clone()),
                None => RemoteJobStatus::NotFound,
            },
            Some(Err(e)) => RemoteJobStatus::Unavailable(e.clone()),
            None => RemoteJobStatus::Unavailable("job list not loaded".to_string()),
        }
    }
}
