//! Probes that each contribute one signal toward a stability verdict
//!
//! Filesystem probes (`temp_file`, `size`, `hash`) read local state only.
//! The two integration probes (`remote_job`, `sync_api`) talk to optional
//! external services through the [`JobSource`] and [`SyncSource`] traits so
//! the decider can be exercised against in-memory fakes.

pub mod hash;
pub mod remote_job;
pub mod size;
pub mod sync_api;
pub mod temp_file;

use async_trait::async_trait;
use mediasort_api::{
    ApiError, BrowseEntry, NeedResponse, RemoteJobRecord, RuTorrentClient, SyncthingClient,
    SyncthingFolder,
};

pub use hash::{ContentFingerprint, ContentHashProbe, EMPTY_SENTINEL};
pub use remote_job::{RemoteJobProbe, RemoteJobStatus};
pub use size::{CandidateFiles, SizeChange, SizeSnapshot, SizeStabilityProbe, SizeStabilityReport};
pub use sync_api::{PathMapping, SyncApiProbe, SyncApiStatus};
pub use temp_file::TempFileProbe;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Uniform reading of a probe result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Evidence the transfer is finished as far as this probe can see
    Clear(String),
    /// Evidence the transfer is still in flight
    Pending(String),
    /// No evidence either way; later probes decide
    Indeterminate(String),
}

impl Signal {
    pub fn is_pending(&self) -> bool {
        matches!(self, Signal::Pending(_))
    }

    pub fn detail(&self) -> &str {
        match self {
            Signal::Clear(d) | Signal::Pending(d) | Signal::Indeterminate(d) => d,
        }
    }
}

/// Something that can list remote download jobs
#[async_trait]
pub trait JobSource: Send + Sync {
    async fn list_jobs(&self) -> ApiResult<Vec<RemoteJobRecord>>;
}

#[async_trait]
impl JobSource for RuTorrentClient {
    async fn list_jobs(&self) -> ApiResult<Vec<RemoteJobRecord>> {
        RuTorrentClient::list_jobs(self).await
    }
}

/// The sync tool endpoints the API probe needs
#[async_trait]
pub trait SyncSource: Send + Sync {
    async fn ping(&self) -> ApiResult<()>;
    async fn folders(&self) -> ApiResult<Vec<SyncthingFolder>>;
    async fn need(&self, folder_id: &str) -> ApiResult<NeedResponse>;
    async fn browse(&self, folder_id: &str, prefix: &str, levels: Option<u32>) -> ApiResult<Vec<BrowseEntry>>;
}

#[async_trait]
impl SyncSource for SyncthingClient {
    async fn ping(&self) -> ApiResult<()> {
        SyncthingClient::ping(self).await
    }

    async fn folders(&self) -> ApiResult<Vec<SyncthingFolder>> {
        SyncthingClient::folders(self).await
    }

    async fn need(&self, folder_id: &str) -> ApiResult<NeedResponse> {
        SyncthingClient::need(self, folder_id).await
    }

    async fn browse(&self, folder_id: &str, prefix: &str, levels: Option<u32>) -> ApiResult<Vec<BrowseEntry>> {
        SyncthingClient::browse(self, folder_id, prefix, levels).await
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory sources for probe and decider tests

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    pub struct FakeJobs {
        pub jobs: Vec<RemoteJobRecord>,
        pub fail: bool,
        pub calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl JobSource for FakeJobs {
        async fn list_jobs(&self) -> ApiResult<Vec<RemoteJobRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ApiError::Server {
                    status: 502,
                    message: "bad gateway".to_string(),
                })
            } else {
                Ok(self.jobs.clone())
            }
        }
    }

    pub fn job(hash: &str, base_path: &str, chunks: u64, done_chunks: u64) -> RemoteJobRecord {
        RemoteJobRecord {
            hash: hash.to_string(),
            name: base_path.rsplit('/').next().unwrap_or_default().to_string(),
            size_bytes: chunks * 1024,
            size_chunks: chunks,
            completed_chunks: done_chunks,
            bytes_done: done_chunks * 1024,
            label: String::new(),
            base_path: base_path.to_string(),
        }
    }

    #[derive(Default)]
    pub struct FakeSync {
        pub ping_fails: bool,
        pub folders: Vec<SyncthingFolder>,
        pub need: HashMap<String, NeedResponse>,
        pub need_not_found: bool,
        pub browse: HashMap<String, Vec<BrowseEntry>>,
        pub folder_calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SyncSource for FakeSync {
        async fn ping(&self) -> ApiResult<()> {
            if self.ping_fails {
                Err(ApiError::malformed("connection refused"))
            } else {
                Ok(())
            }
        }

        async fn folders(&self) -> ApiResult<Vec<SyncthingFolder>> {
            self.folder_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.folders.clone())
        }

        async fn need(&self, folder_id: &str) -> ApiResult<NeedResponse> {
            if self.need_not_found {
                return Err(ApiError::NotFound(format!("folder {}", folder_id)));
            }
            Ok(self.need.get(folder_id).cloned().unwrap_or_default())
        }

        async fn browse(&self, _folder_id: &str, prefix: &str, _levels: Option<u32>) -> ApiResult<Vec<BrowseEntry>> {
            Ok(self.browse.get(prefix).cloned().unwrap_or_default())
        }
    }

    pub fn folder(id: &str, path: &str) -> SyncthingFolder {
        SyncthingFolder {
            id: id.to_string(),
            label: id.to_string(),
            path: path.to_string(),
            paused: false,
        }
    }

    pub fn file_entry(name: &str, size: u64) -> BrowseEntry {
        BrowseEntry {
            name: name.to_string(),
            size,
            kind: "FILE_INFO_TYPE_FILE".to_string(),
            children: Vec::new(),
        }
    }
}
