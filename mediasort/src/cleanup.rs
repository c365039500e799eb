//! Removing the seedbox copy of an item once it has been moved

use async_trait::async_trait;
use mediasort_api::api::Result as ApiResult;
use mediasort_api::SftpClient;
use tracing::{info, warn};

/// A remote store that can delete an item by name
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Delete the entry named `name`, returning its remote path, or `None`
    /// when nothing by that name exists.
    async fn delete_item(&self, name: &str, is_dir: bool) -> ApiResult<Option<String>>;
}

#[async_trait]
impl RemoteStore for SftpClient {
    async fn delete_item(&self, name: &str, is_dir: bool) -> ApiResult<Option<String>> {
        SftpClient::delete_item(self, name, is_dir).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    Deleted(String),
    WouldDelete,
    NotFound,
    Failed(String),
}

impl CleanupOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CleanupOutcome::Deleted(_) | CleanupOutcome::WouldDelete)
    }
}

/// Deletes moved items from a [`RemoteStore`], honoring dry-run
pub struct RemoteCleanup {
    store: Box<dyn RemoteStore>,
    dry_run: bool,
}

impl RemoteCleanup {
    pub fn new(store: Box<dyn RemoteStore>, dry_run: bool) -> Self {
        Self { store, dry_run }
    }

    pub async fn remove(&self, name: &str, is_dir: bool) -> CleanupOutcome {
        let kind = if is_dir { "directory" } else { "file" };
        if self.dry_run {
            info!("[DRY-RUN] Would search and delete {} from SFTP: {}", kind, name);
            return CleanupOutcome::WouldDelete;
        }

        match self.store.delete_item(name, is_dir).await {
            Ok(Some(path)) => CleanupOutcome::Deleted(path),
            Ok(None) => {
                warn!("Failed to delete '{}' from SFTP server: not found", name);
                CleanupOutcome::NotFound
            }
            Err(e) => {
                warn!("Failed to delete '{}' from SFTP server: {}", name, e);
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use super::*;
    use mediasort_api::ApiError;
    use std::sync::{Arc, Mutex};

    /// Records deletions; names listed in `present` exist remotely.
    #[derive(Default, Clone)]
    pub struct FakeStore {
        pub present: Vec<String>,
        pub fail: bool,
        pub deleted: Arc<Mutex<Vec<(String, bool)>>>,
    }

    #[async_trait]
    impl RemoteStore for FakeStore {
        async fn delete_item(&self, name: &str, is_dir: bool) -> ApiResult<Option<String>> {
            if self.fail {
                return Err(ApiError::Remote("connection reset".to_string()));
            }
            if !self.present.iter().any(|p| p == name) {
                return Ok(None);
            }
            self.deleted.lock().unwrap().push((name.to_string(), is_dir));
            Ok(Some(format!("/downloads/{}", name)))
        }
    }
}
