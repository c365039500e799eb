//! Destination routing by media type and airing status

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShowStatus {
    Current,
    Concluded,
    Unknown,
}

impl ShowStatus {
    /// Map a metadata provider's status string
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_lowercase().as_str() {
            "ended" | "canceled" | "cancelled" | "concluded" => ShowStatus::Concluded,
            "continuing" | "returning series" | "in production" | "upcoming" | "current" => ShowStatus::Current,
            _ => ShowStatus::Unknown,
        }
    }
}

impl fmt::Display for ShowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShowStatus::Current => "CURRENT",
            ShowStatus::Concluded => "CONCLUDED",
            ShowStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Source of a show's airing status
#[async_trait]
pub trait ShowStatusLookup: Send + Sync {
    async fn status(&self, title: &str, year: Option<u32>) -> ShowStatus;
}

/// Reports every show as currently airing
#[derive(Debug, Default)]
pub struct AssumeCurrent;

#[async_trait]
impl ShowStatusLookup for AssumeCurrent {
    async fn status(&self, _title: &str, _year: Option<u32>) -> ShowStatus {
        ShowStatus::Current
    }
}

/// Fixed title to status table; titles compare case-insensitively
#[derive(Debug, Default)]
pub struct StaticStatusLookup {
    statuses: HashMap<String, ShowStatus>,
}

impl StaticStatusLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, title: &str, status: ShowStatus) -> Self {
        self.statuses.insert(title.to_lowercase(), status);
        self
    }

    /// Every listed title is concluded
    pub fn concluded<I, S>(titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        titles
            .into_iter()
            .fold(Self::new(), |lookup, t| lookup.with(t.as_ref(), ShowStatus::Concluded))
    }

    pub fn get(&self, title: &str) -> Option<ShowStatus> {
        self.statuses.get(&title.to_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[async_trait]
impl ShowStatusLookup for StaticStatusLookup {
    async fn status(&self, title: &str, _year: Option<u32>) -> ShowStatus {
        self.get(title).unwrap_or(ShowStatus::Current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Movie,
    TvShow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: MediaKind,
    pub status: Option<ShowStatus>,
    pub destination: PathBuf,
}

/// Library roots items are sorted into
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryDirs {
    pub movies: PathBuf,
    pub tv_current: PathBuf,
    pub tv_concluded: PathBuf,
}

pub struct ContentClassifier {
    dirs: LibraryDirs,
    lookup: Box<dyn ShowStatusLookup>,
}

impl ContentClassifier {
    pub fn new(dirs: LibraryDirs, lookup: Box<dyn ShowStatusLookup>) -> Self {
        Self { dirs, lookup }
    }

    pub async fn classify(&self, title: &str, is_tv_show: bool, year: Option<u32>) -> Classification {
        if !is_tv_show {
            return Classification {
                kind: MediaKind::Movie,
                status: None,
                destination: self.dirs.movies.clone(),
            };
        }

        let status = self.lookup.status(title, year).await;
        let destination = match status {
            ShowStatus::Concluded => self.dirs.tv_concluded.clone(),
            // Unknown shows are assumed to still be airing
            ShowStatus::Current | ShowStatus::Unknown => self.dirs.tv_current.clone(),
        };
        debug!("'{}' status {} -> {}", title, status, destination.display());

        Classification {
            kind: MediaKind::TvShow,
            status: Some(status),
            destination,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirs() -> LibraryDirs {
        LibraryDirs {
            movies: PathBuf::from("/lib/Movies"),
            tv_current: PathBuf::from("/lib/TV/Current"),
            tv_concluded: PathBuf::from("/lib/TV/Concluded"),
        }
    }

    #[test]
    fn test_provider_status_mapping() {
        assert_eq!(ShowStatus::from_provider("Ended"), ShowStatus::Concluded);
        assert_eq!(ShowStatus::from_provider("canceled"), ShowStatus::Concluded);
        assert_eq!(ShowStatus::from_provider("Continuing"), ShowStatus::Current);
        assert_eq!(ShowStatus::from_provider("pilot"), ShowStatus::Unknown);
    }

    #[tokio::test]
    async fn test_movie_goes_to_movie_dir() {
        let classifier = ContentClassifier::new(dirs(), Box::new(AssumeCurrent));
        let c = classifier.classify("Movie", false, Some(2020)).await;
        assert_eq!(c.kind, MediaKind::Movie);
        assert_eq!(c.status, None);
        assert_eq!(c.destination, PathBuf::from("/lib/Movies"));
    }

    #[tokio::test]
    async fn test_show_routing_by_status() {
        let lookup = StaticStatusLookup::concluded(["Old Show"]).with("Mystery", ShowStatus::Unknown);
        let classifier = ContentClassifier::new(dirs(), Box::new(lookup));

        let ended = classifier.classify("old show", true, None).await;
        assert_eq!(ended.destination, PathBuf::from("/lib/TV/Concluded"));

        let unknown = classifier.classify("Mystery", true, None).await;
        assert_eq!(unknown.status, Some(ShowStatus::Unknown));
        assert_eq!(unknown.destination, PathBuf::from("/lib/TV/Current"));

        let unlisted = classifier.classify("New Show", true, None).await;
        assert_eq!(unlisted.status, Some(ShowStatus::Current));
    }
}
