use super::error::*;
use ssh2::{Session, Sftp};
use std::collections::VecDeque;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Connection settings for the seedbox SFTP account
#[derive(Debug, Clone)]
pub struct SftpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub remote_dir: String,
    pub timeout: Duration,
}

/// Deletes finished downloads from the remote seedbox over SFTP.
///
/// ssh2 is blocking, so every operation opens its own session on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct SftpClient {
    settings: SftpSettings,
}

impl SftpClient {
    pub fn new(settings: SftpSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SftpSettings {
        &self.settings
    }

    /// Open a session and list the remote directory once.
    pub async fn check_connection(&self) -> Result<()> {
        let settings = self.settings.clone();
        run_blocking(move || {
            let sftp = connect(&settings)?;
            sftp.readdir(Path::new(&settings.remote_dir))?;
            Ok(())
        })
        .await
    }

    /// Find `name` anywhere under the remote directory and delete it.
    ///
    /// Directories are removed with their contents. Returns the deleted
    /// remote path, or `None` when nothing with that name exists.
    pub async fn delete_item(&self, name: &str, is_dir: bool) -> Result<Option<String>> {
        let settings = self.settings.clone();
        let name = name.to_string();
        run_blocking(move || {
            let sftp = connect(&settings)?;
            let root = PathBuf::from(&settings.remote_dir);
            let Some(found) = find_item(&sftp, &root, &name) else {
                debug!("'{}' not found under {} on SFTP server", name, settings.remote_dir);
                return Ok(None);
            };

            if is_dir {
                remove_tree(&sftp, &found)?;
            } else {
                sftp.unlink(&found)?;
            }
            info!("Deleted {} from SFTP server", found.display());
            Ok(Some(found.display().to_string()))
        })
        .await
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Remote(format!("SFTP task failed: {}", e)))?
}

fn connect(settings: &SftpSettings) -> Result<Sftp> {
    let addr = (settings.host.as_str(), settings.port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| ApiError::Remote(format!("cannot resolve {}:{}", settings.host, settings.port)))?;

    let tcp = TcpStream::connect_timeout(&addr, settings.timeout)?;
    let mut session = Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(settings.timeout.as_millis()).unwrap_or(u32::MAX));
    session.handshake()?;
    session.userauth_password(&settings.username, &settings.password)?;
    if !session.authenticated() {
        return Err(ApiError::Authentication(format!(
            "SFTP server refused password for '{}'",
            settings.username
        )));
    }

    debug!("Connected to SFTP server {}:{}", settings.host, settings.port);
    Ok(session.sftp()?)
}

/// The directory operations the remote walk needs.
trait RemoteTree {
    fn list(&self, dir: &Path) -> Result<Vec<(PathBuf, bool)>>;
    fn remove_file(&self, path: &Path) -> Result<()>;
    fn remove_dir(&self, path: &Path) -> Result<()>;
}

impl RemoteTree for Sftp {
    fn list(&self, dir: &Path) -> Result<Vec<(PathBuf, bool)>> {
        Ok(self
            .readdir(dir)?
            .into_iter()
            .map(|(path, stat)| (path, stat.is_dir()))
            .collect())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        Ok(self.unlink(path)?)
    }

    fn remove_dir(&self, path: &Path) -> Result<()> {
        Ok(self.rmdir(path)?)
    }
}

/// `Path::file_name` folds a trailing `.` away, so look at the raw segment.
fn is_dot_entry(path: &Path) -> bool {
    let raw = path.to_string_lossy();
    let last = raw.rsplit('/').next().unwrap_or_default();
    matches!(last, "." | "..")
}

/// Breadth-first search for an entry named exactly `name`.
///
/// Unreadable directories are skipped.
fn find_item(tree: &impl RemoteTree, root: &Path, name: &str) -> Option<PathBuf> {
    let mut queue = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let entries = match tree.list(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {} on SFTP server: {}", dir.display(), e);
                continue;
            }
        };
        for (path, is_dir) in entries {
            if is_dot_entry(&path) {
                continue;
            }
            if path.file_name().and_then(|n| n.to_str()) == Some(name) {
                return Some(path);
            }
            if is_dir {
                queue.push_back(path);
            }
        }
    }
    None
}

fn remove_tree(tree: &impl RemoteTree, dir: &Path) -> Result<()> {
    for (path, is_dir) in tree.list(dir)? {
        if is_dot_entry(&path) {
            continue;
        }
        if is_dir {
            remove_tree(tree, &path)?;
        } else {
            tree.remove_file(&path)?;
        }
    }
    tree.remove_dir(dir)
}
