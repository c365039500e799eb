//! Single-instance process lock

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Exclusive advisory lock held until dropped; the lock file is removed on release
pub struct ProcessLock {
    path: PathBuf,
    file: File,
}

impl ProcessLock {
    /// Wait up to `timeout` for the lock, polling once a second
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create lock directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file {}", path.display()))?;

        debug!("Attempting to acquire lock: {}", path.display());
        let start = Instant::now();
        let mut waited = false;

        loop {
            if try_lock(&file)? {
                if waited {
                    info!("Lock acquired after waiting");
                } else {
                    debug!("Lock acquired: {}", path.display());
                }
                let mut lock = Self {
                    path: path.to_path_buf(),
                    file,
                };
                lock.write_pid();
                return Ok(lock);
            }

            if start.elapsed() >= timeout {
                bail!(
                    "Timed out after {:?} waiting for lock {}; another instance is still running",
                    timeout,
                    path.display()
                );
            }
            if !waited {
                info!("Another instance is running. Waiting for lock...");
                waited = true;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_pid(&mut self) {
        let result = self
            .file
            .set_len(0)
            .and_then(|_| write!(self.file, "{}", std::process::id()))
            .and_then(|_| self.file.flush());
        if let Err(e) = result {
            debug!("Could not write pid to lock file: {}", e);
        }
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if let Err(e) = unlock(&self.file) {
            warn!("Failed to release lock: {}", e);
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!("Lock file not removed: {}", e);
        } else {
            debug!("Lock released: {}", self.path.display());
        }
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<bool> {
    use nix::errno::Errno;
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(true),
        Err(Errno::EWOULDBLOCK) => Ok(false),
        Err(e) => Err(e).context("Failed to acquire lock"),
    }
}

#[cfg(unix)]
fn unlock(file: &File) -> Result<()> {
    use nix::fcntl::{flock, FlockArg};
    use std::os::unix::io::AsRawFd;

    flock(file.as_raw_fd(), FlockArg::Unlock)?;
    Ok(())
}

// No advisory locking off unix; the open handle is the only guard
#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn unlock(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("run/mediasort.lock");

        let lock = ProcessLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        assert!(path.exists());
        let pid = std::fs::read_to_string(&path).unwrap();
        assert_eq!(pid, std::process::id().to_string());

        drop(lock);
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_second_holder_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mediasort.lock");

        let _held = ProcessLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        let err = ProcessLock::acquire(&path, Duration::ZERO).await.err().unwrap();
        assert!(err.to_string().contains("another instance is still running"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_waits_for_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mediasort.lock");

        let held = ProcessLock::acquire(&path, Duration::from_secs(1)).await.unwrap();
        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(held);
        });

        let lock = ProcessLock::acquire(&path, Duration::from_secs(5)).await.unwrap();
        releaser.await.unwrap();
        assert_eq!(lock.path(), path.as_path());
    }
}
