//! Sync tool REST API probe
//!
//! Asks the sync tool whether anything under a candidate is still needed.
//! Every failure degrades to [`SyncApiStatus::Unavailable`] or
//! [`SyncApiStatus::Untracked`]; the probe never returns an error.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use mediasort_api::BrowseEntry;

use super::{Signal, SyncSource};

/// Ordered `remote:local` prefix rewrites
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMapping {
    pairs: Vec<(PathBuf, PathBuf)>,
}

impl PathMapping {
    /// Parse `remote:local,remote2:local2`. Malformed pairs are skipped with a warning.
    pub fn parse(raw: &str) -> Self {
        let mut pairs = Vec::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match pair.split_once(':') {
                Some((remote, local)) if !remote.trim().is_empty() && !local.trim().is_empty() => {
                    pairs.push((PathBuf::from(remote.trim()), PathBuf::from(local.trim())));
                }
                _ => warn!("Invalid path mapping entry: '{}'", pair),
            }
        }
        Self { pairs }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(PathBuf, PathBuf)] {
        &self.pairs
    }

    /// Add the resolved form of every local prefix that goes through a
    /// symlink, right after the prefix as written. Candidates are compared
    /// after `canonicalize`, so a symlinked mount only matches this way.
    /// Prefixes that cannot be resolved are kept as written.
    pub fn with_resolved_prefixes(self) -> Self {
        let mut pairs = Vec::with_capacity(self.pairs.len());
        for (remote, local) in self.pairs {
            let resolved = std::fs::canonicalize(&local).ok();
            pairs.push((remote.clone(), local.clone()));
            if let Some(resolved) = resolved.filter(|r| *r != local) {
                debug!("Path mapping '{}' resolves to '{}'", local.display(), resolved.display());
                pairs.push((remote, resolved));
            }
        }
        Self { pairs }
    }

    /// Rewrite a local path into the sync tool's view. The first matching
    /// local prefix wins; unmapped paths come back unchanged.
    pub fn to_remote(&self, local: &Path) -> PathBuf {
        for (remote, local_prefix) in &self.pairs {
            if let Ok(rest) = local.strip_prefix(local_prefix) {
                return if rest.as_os_str().is_empty() {
                    remote.clone()
                } else {
                    remote.join(rest)
                };
            }
        }
        local.to_path_buf()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncApiStatus {
    /// Files under the candidate are still needed
    Syncing { pending_files: usize, pending_bytes: u64 },
    /// The sync tool tracks the candidate and needs nothing more
    Synced { folder_id: String },
    /// No configured sync folder contains the candidate
    Untracked { reason: String },
    /// The API could not answer
    Unavailable { reason: String },
}

impl SyncApiStatus {
    pub fn is_tracked(&self) -> bool {
        matches!(self, SyncApiStatus::Synced { .. })
    }

    pub fn signal(&self) -> Signal {
        match self {
            SyncApiStatus::Syncing {
                pending_files,
                pending_bytes,
            } => Signal::Pending(format!(
                "{} file(s) still needed ({} bytes)",
                pending_files, pending_bytes
            )),
            SyncApiStatus::Synced { folder_id } => {
                Signal::Clear(format!("fully synced in folder '{}'", folder_id))
            }
            SyncApiStatus::Untracked { reason } => {
                Signal::Indeterminate(format!("untracked ({}), using temp file verdict", reason))
            }
            SyncApiStatus::Unavailable { reason } => {
                Signal::Indeterminate(format!("API unavailable ({}), using temp file verdict", reason))
            }
        }
    }
}

struct FolderRoot {
    id: String,
    root: PathBuf,
}

pub struct SyncApiProbe {
    source: Box<dyn SyncSource>,
    mapping: PathMapping,
    reachable: Option<bool>,
    folders: Option<std::result::Result<Vec<FolderRoot>, String>>,
}

impl SyncApiProbe {
    pub fn new(source: Box<dyn SyncSource>, mapping: PathMapping) -> Self {
        let mapping = mapping.with_resolved_prefixes();
        if !mapping.is_empty() {
            info!("Sync API path mapping: {:?}", mapping.pairs());
        }
        Self {
            source,
            mapping,
            reachable: None,
            folders: None,
        }
    }

    /// Forget the ping result and folder map
    pub fn reset(&mut self) {
        self.reachable = None;
        self.folders = None;
    }

    pub async fn check(&mut self, candidate: &Path, is_dir: bool) -> SyncApiStatus {
        if !self.is_reachable().await {
            return SyncApiStatus::Unavailable {
                reason: "ping failed".to_string(),
            };
        }

        let local = fs::canonicalize(candidate)
            .await
            .unwrap_or_else(|_| candidate.to_path_buf());
        let remote = self.mapping.to_remote(&local);

        let (folder_id, prefix) = match self.resolve_folder(&remote).await {
            Ok(Some(found)) => found,
            Ok(None) => {
                debug!("'{}' is outside every sync folder", remote.display());
                return SyncApiStatus::Untracked {
                    reason: "no sync folder contains this path".to_string(),
                };
            }
            Err(reason) => return SyncApiStatus::Unavailable { reason },
        };

        let pending = self.pending(&folder_id, &prefix, &local, is_dir).await;
        match pending {
            Ok((0, _)) => SyncApiStatus::Synced { folder_id },
            Ok((pending_files, pending_bytes)) => SyncApiStatus::Syncing {
                pending_files,
                pending_bytes,
            },
            Err(reason) => SyncApiStatus::Unavailable { reason },
        }
    }

    async fn is_reachable(&mut self) -> bool {
        if let Some(reachable) = self.reachable {
            return reachable;
        }
        let reachable = match self.source.ping().await {
            Ok(()) => {
                info!("Sync API reachable");
                true
            }
            Err(e) => {
                warn!("Sync API not available: {}", e);
                false
            }
        };
        self.reachable = Some(reachable);
        reachable
    }

    /// Folder id and folder-relative prefix (`/`-joined, empty for the root)
    async fn resolve_folder(&mut self, remote: &Path) -> std::result::Result<Option<(String, String)>, String> {
        if self.folders.is_none() {
            let loaded = match self.source.folders().await {
                Ok(folders) => {
                    debug!("Sync API reports {} folder(s)", folders.len());
                    Ok(folders
                        .into_iter()
                        .map(|f| FolderRoot {
                            id: f.id,
                            root: PathBuf::from(f.path.trim_end_matches('/')),
                        })
                        .collect())
                }
                Err(e) => Err(format!("folder list: {}", e)),
            };
            self.folders = Some(loaded);
        }

        let folders = match &self.folders {
            Some(Ok(folders)) => folders,
            Some(Err(reason)) => return Err(reason.clone()),
            None => return Ok(None),
        };

        // Nested roots resolve to the deepest one
        let best = folders
            .iter()
            .filter_map(|f| remote.strip_prefix(&f.root).ok().map(|rest| (f, rest)))
            .max_by_key(|(f, _)| f.root.components().count());

        Ok(best.map(|(folder, rest)| (folder.id.clone(), relative_prefix(rest))))
    }

    async fn pending(
        &self,
        folder_id: &str,
        prefix: &str,
        local: &Path,
        is_dir: bool,
    ) -> std::result::Result<(usize, u64), String> {
        let need = self.source.need(folder_id).await.map_err(|e| {
            if e.is_not_found() {
                format!("folder '{}' paused or not found", folder_id)
            } else {
                format!("need: {}", e)
            }
        })?;

        let dir_prefix = format!("{}/", prefix);
        let under_candidate = |name: &str| {
            if !is_dir {
                name == prefix
            } else {
                prefix.is_empty() || name.starts_with(&dir_prefix)
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut pending_bytes = 0u64;
        for entry in need.all_entries().filter(|e| under_candidate(&e.name)) {
            if seen.insert(entry.name.clone()) {
                pending_bytes += entry.size;
            }
        }

        if is_dir {
            let expected = self
                .source
                .browse(folder_id, prefix, None)
                .await
                .map_err(|e| format!("browse: {}", e))?;

            let mut files = Vec::new();
            flatten_files(&expected, "", &mut files);

            for (relative, size) in files {
                let folder_relative = if prefix.is_empty() {
                    relative.clone()
                } else {
                    format!("{}/{}", prefix, relative)
                };
                if seen.contains(&folder_relative) {
                    continue;
                }
                if fs::symlink_metadata(local.join(&relative)).await.is_err() {
                    debug!("'{}' expected but not present locally", folder_relative);
                    seen.insert(folder_relative);
                    pending_bytes += size;
                }
            }
        }

        Ok((seen.len(), pending_bytes))
    }
}

fn relative_prefix(rest: &Path) -> String {
    rest.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn flatten_files(entries: &[BrowseEntry], parent: &str, out: &mut Vec<(String, u64)>) {
    for entry in entries {
        let path = if parent.is_empty() {
            entry.name.clone()
        } else {
            format!("{}/{}", parent, entry.name)
        };
        if entry.is_file() {
            out.push((path, entry.size));
        } else if !entry.children.is_empty() {
            flatten_files(&entry.children, &path, out);
        }
    }
}
