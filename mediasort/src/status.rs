//! Show airing status from TheTVDB, cached on disk

use crate::classifier::{ShowStatus, ShowStatusLookup, StaticStatusLookup};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediasort_api::api::Result as ApiResult;
use mediasort_api::{SeriesStatus, TvdbClient};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Where series statuses come from
#[async_trait]
pub trait SeriesSource: Send + Sync {
    async fn show_status(&self, title: &str, year: Option<u32>) -> ApiResult<Option<SeriesStatus>>;
}

#[async_trait]
impl SeriesSource for TvdbClient {
    async fn show_status(&self, title: &str, year: Option<u32>) -> ApiResult<Option<SeriesStatus>> {
        TvdbClient::show_status(self, title, year).await
    }
}

impl ShowStatus {
    /// Map TheTVDB's status record; the numeric id wins over the name.
    pub fn from_series(status: &SeriesStatus) -> Self {
        match status.id {
            Some(2) => ShowStatus::Concluded,
            Some(1) => ShowStatus::Current,
            _ => match ShowStatus::from_provider(&status.name) {
                ShowStatus::Unknown if !status.name.is_empty() => {
                    warn!("Unrecognized series status '{}', treating as current", status.name);
                    ShowStatus::Current
                }
                mapped => mapped,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    stored_at: DateTime<Utc>,
    status: ShowStatus,
}

/// One JSON file per show, expired after `ttl`
#[derive(Debug, Clone)]
pub struct StatusCache {
    dir: PathBuf,
    ttl: Duration,
}

impl StatusCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self { dir: dir.into(), ttl }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn key(title: &str, year: Option<u32>) -> String {
        let year = year.map(|y| y.to_string()).unwrap_or_else(|| "unknown".to_string());
        format!("show_status_{}_{}", title.to_lowercase(), year)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }

    pub async fn get(&self, key: &str) -> Option<ShowStatus> {
        let path = self.entry_path(key);
        let raw = tokio::fs::read(&path).await.ok()?;
        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Discarding unreadable cache entry {}: {}", path.display(), e);
                let _ = tokio::fs::remove_file(&path).await;
                return None;
            }
        };

        let age = Utc::now().signed_duration_since(entry.stored_at).to_std().unwrap_or_default();
        if age > self.ttl {
            let _ = tokio::fs::remove_file(&path).await;
            return None;
        }
        Some(entry.status)
    }

    /// Store a status; failures only cost a lookup next run.
    pub async fn set(&self, key: &str, status: ShowStatus) {
        let entry = CacheEntry {
            stored_at: Utc::now(),
            status,
        };
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let body = serde_json::to_vec(&entry).map_err(std::io::Error::other)?;
            tokio::fs::write(self.entry_path(key), body).await
        }
        .await;

        if let Err(e) = result {
            warn!("Failed to write status cache in {}: {}", self.dir.display(), e);
        }
    }
}

/// Looks shows up in a [`SeriesSource`], after configured overrides and the cache.
///
/// Titles with no match are cached as unknown; provider errors are not cached.
pub struct ProviderStatusLookup {
    source: Box<dyn SeriesSource>,
    cache: Option<StatusCache>,
    overrides: StaticStatusLookup,
}

impl ProviderStatusLookup {
    pub fn new(source: Box<dyn SeriesSource>) -> Self {
        Self {
            source,
            cache: None,
            overrides: StaticStatusLookup::new(),
        }
    }

    pub fn with_cache(mut self, cache: StatusCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_overrides(mut self, overrides: StaticStatusLookup) -> Self {
        self.overrides = overrides;
        self
    }
}

#[async_trait]
impl ShowStatusLookup for ProviderStatusLookup {
    async fn status(&self, title: &str, year: Option<u32>) -> ShowStatus {
        if let Some(status) = self.overrides.get(title) {
            return status;
        }

        let key = StatusCache::key(title, year);
        if let Some(cache) = &self.cache {
            if let Some(status) = cache.get(&key).await {
                debug!("Status cache hit for '{}': {}", title, status);
                return status;
            }
        }

        let status = match self.source.show_status(title, year).await {
            Ok(Some(series)) => ShowStatus::from_series(&series),
            Ok(None) => {
                debug!("No series found for '{}'", title);
                ShowStatus::Unknown
            }
            Err(e) => {
                warn!("Series status lookup failed for '{}': {}", title, e);
                return ShowStatus::Unknown;
            }
        };

        if let Some(cache) = &self.cache {
            cache.set(&key, status).await;
        }
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediasort_api::ApiError;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeSeries {
        statuses: HashMap<String, SeriesStatus>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl SeriesSource for FakeSeries {
        async fn show_status(&self, title: &str, _year: Option<u32>) -> ApiResult<Option<SeriesStatus>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ApiError::Server {
                    status: 503,
                    message: "down".to_string(),
                });
            }
            Ok(self.statuses.get(title).cloned())
        }
    }

    fn series(id: Option<u64>, name: &str) -> SeriesStatus {
        SeriesStatus {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_series_status_mapping() {
        assert_eq!(ShowStatus::from_series(&series(Some(2), "")), ShowStatus::Concluded);
        assert_eq!(ShowStatus::from_series(&series(Some(1), "Ended")), ShowStatus::Current);
        assert_eq!(ShowStatus::from_series(&series(None, "Cancelled")), ShowStatus::Concluded);
        assert_eq!(ShowStatus::from_series(&series(Some(3), "Upcoming")), ShowStatus::Current);
        assert_eq!(ShowStatus::from_series(&series(None, "Pilot")), ShowStatus::Current);
        assert_eq!(ShowStatus::from_series(&series(None, "")), ShowStatus::Unknown);
    }

    #[tokio::test]
    async fn test_cache_round_trip_and_expiry() {
        let temp_dir = TempDir::new().unwrap();
        let cache = StatusCache::new(temp_dir.path().join("cache"), Duration::from_secs(60));
        let key = StatusCache::key("Show: Part/2", Some(2010));

        assert_eq!(cache.get(&key).await, None);
        cache.set(&key, ShowStatus::Concluded).await;
        assert_eq!(cache.get(&key).await, Some(ShowStatus::Concluded));
        assert!(temp_dir.path().join("cache/show_status_show__part_2_2010.json").exists());

        let expired = StatusCache::new(temp_dir.path().join("cache"), Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(expired.get(&key).await, None);
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_lookup_caches_provider_answers() {
        let temp_dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FakeSeries {
            statuses: HashMap::from([("Old Show".to_string(), series(Some(2), "Ended"))]),
            calls: calls.clone(),
            ..Default::default()
        };
        let lookup = ProviderStatusLookup::new(Box::new(source))
            .with_cache(StatusCache::new(temp_dir.path(), DEFAULT_CACHE_TTL));

        assert_eq!(lookup.status("Old Show", None).await, ShowStatus::Concluded);
        assert_eq!(lookup.status("Old Show", None).await, ShowStatus::Concluded);
        assert_eq!(lookup.status("Nobody Knows", None).await, ShowStatus::Unknown);
        assert_eq!(lookup.status("Nobody Knows", None).await, ShowStatus::Unknown);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_provider_errors_are_unknown_and_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FakeSeries {
            fail: true,
            calls: calls.clone(),
            ..Default::default()
        };
        let lookup = ProviderStatusLookup::new(Box::new(source))
            .with_cache(StatusCache::new(temp_dir.path(), DEFAULT_CACHE_TTL));

        assert_eq!(lookup.status("Show", Some(2020)).await, ShowStatus::Unknown);
        assert_eq!(lookup.status("Show", Some(2020)).await, ShowStatus::Unknown);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_overrides_skip_the_provider() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FakeSeries {
            statuses: HashMap::from([("Old Show".to_string(), series(Some(1), "Continuing"))]),
            calls: calls.clone(),
            ..Default::default()
        };
        let lookup = ProviderStatusLookup::new(Box::new(source))
            .with_overrides(StaticStatusLookup::concluded(["old show"]));

        assert_eq!(lookup.status("Old Show", None).await, ShowStatus::Concluded);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
