//! Content fingerprints for files the sync tool does not track
//!
//! Small files are hashed in full with blake3. Large files are sampled:
//! the first and last `sample_size` bytes plus the length, so a fingerprint
//! costs at most two short reads regardless of file size.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::{Result, StabilityError};

/// Fingerprint recorded for an empty file
pub const EMPTY_SENTINEL: &str = "empty";

pub const DEFAULT_FULL_HASH_THRESHOLD: u64 = 8 * 1024 * 1024;
pub const DEFAULT_SAMPLE_SIZE: u64 = 1024 * 1024;
/// Largest head/tail sample; each sample is one buffer allocation
pub const MAX_SAMPLE_SIZE: u64 = 64 * 1024 * 1024;

/// Fingerprint per file path
pub type ContentFingerprint = HashMap<PathBuf, String>;

pub struct ContentHashProbe {
    full_hash_threshold: u64,
    sample_size: u64,
}

impl Default for ContentHashProbe {
    fn default() -> Self {
        Self::new(DEFAULT_FULL_HASH_THRESHOLD, DEFAULT_SAMPLE_SIZE)
    }
}

impl ContentHashProbe {
    /// Files smaller than `full_hash_threshold` are hashed in full.
    /// The threshold never drops below two samples so head and tail can't overlap.
    /// `sample_size` is clamped to `1..=MAX_SAMPLE_SIZE`.
    pub fn new(full_hash_threshold: u64, sample_size: u64) -> Self {
        let sample_size = sample_size.clamp(1, MAX_SAMPLE_SIZE);
        Self {
            full_hash_threshold: full_hash_threshold.max(sample_size.saturating_mul(2)),
            sample_size,
        }
    }

    pub async fn fingerprint(&self, files: &[PathBuf]) -> Result<ContentFingerprint> {
        let mut fingerprint = ContentFingerprint::with_capacity(files.len());
        for file in files {
            if fingerprint.contains_key(file) {
                continue;
            }
            let digest = self.hash_file(file).await?;
            fingerprint.insert(file.clone(), digest);
        }
        Ok(fingerprint)
    }

    pub async fn hash_file(&self, path: &Path) -> Result<String> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| StabilityError::from_io(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| StabilityError::from_io(path, e))?
            .len();

        if len == 0 {
            return Ok(EMPTY_SENTINEL.to_string());
        }

        if len < self.full_hash_threshold {
            self.full_digest(&mut file, path).await
        } else {
            self.sampled_digest(&mut file, path, len).await
        }
    }

    async fn full_digest(&self, file: &mut fs::File, path: &Path) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = file
                .read(&mut buffer)
                .await
                .map_err(|e| StabilityError::from_io(path, e))?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Head, tail and `len`. A file truncated below `len` since it was
    /// stat'ed fails with [`StabilityError::FileVanished`].
    async fn sampled_digest(&self, file: &mut fs::File, path: &Path, len: u64) -> Result<String> {
        let mut hasher = blake3::Hasher::new();
        let mut sample = vec![0; self.sample_size as usize];

        file.read_exact(&mut sample)
            .await
            .map_err(|e| StabilityError::from_io(path, e))?;
        hasher.update(&sample);

        file.seek(SeekFrom::Start(len.saturating_sub(self.sample_size)))
            .await
            .map_err(|e| StabilityError::hash_error(path, format!("Failed to seek: {}", e)))?;
        file.read_exact(&mut sample)
            .await
            .map_err(|e| StabilityError::from_io(path, e))?;
        hasher.update(&sample);
        hasher.update(&len.to_le_bytes());

        Ok(hasher.finalize().to_hex().to_string())
    }

    /// Files whose fingerprint differs between two passes.
    /// A file missing from `after` counts as changed.
    pub fn changed_files<'a>(before: &'a ContentFingerprint, after: &ContentFingerprint) -> Vec<&'a Path> {
        let mut changed: Vec<&Path> = before
            .iter()
            .filter(|(path, digest)| after.get(*path) != Some(*digest))
            .map(|(path, _)| path.as_path())
            .collect();
        changed.sort();
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_empty_file_uses_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let empty = temp_dir.path().join("empty.nfo");
        fs::write(&empty, b"").await.unwrap();

        let digest = ContentHashProbe::default().hash_file(&empty).await.unwrap();
        assert_eq!(digest, EMPTY_SENTINEL);
    }

    #[tokio::test]
    async fn test_small_file_full_hash() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("small.srt");
        fs::write(&file, b"hello world").await.unwrap();

        let digest = ContentHashProbe::default().hash_file(&file).await.unwrap();
        assert_eq!(digest, blake3::hash(b"hello world").to_hex().to_string());
    }

    #[tokio::test]
    async fn test_sampled_hash_sees_tail_rewrite() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("big.mkv");
        let mut data = vec![7u8; 64];
        fs::write(&file, &data).await.unwrap();

        // Threshold 32 with 8 byte samples forces sampling
        let probe = ContentHashProbe::new(32, 8);
        let before = probe.fingerprint(&[file.clone()]).await.unwrap();

        let last = data.len() - 1;
        data[last] = 9;
        fs::write(&file, &data).await.unwrap();
        let after = probe.fingerprint(&[file.clone()]).await.unwrap();

        assert_eq!(ContentHashProbe::changed_files(&before, &after), vec![file.as_path()]);
    }

    #[tokio::test]
    async fn test_sampled_hash_ignores_middle() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("big.mkv");
        let mut data = vec![1u8; 64];
        fs::write(&file, &data).await.unwrap();

        let probe = ContentHashProbe::new(32, 8);
        let before = probe.hash_file(&file).await.unwrap();
        data[32] = 2;
        fs::write(&file, &data).await.unwrap();
        assert_eq!(before, probe.hash_file(&file).await.unwrap());
    }

    #[test]
    fn test_threshold_never_below_two_samples() {
        let probe = ContentHashProbe::new(10, 8);
        assert_eq!(probe.full_hash_threshold, 16);
    }

    #[test]
    fn test_huge_sample_size_is_clamped() {
        let probe = ContentHashProbe::new(0, u64::MAX);
        assert_eq!(probe.sample_size, MAX_SAMPLE_SIZE);
        assert_eq!(probe.full_hash_threshold, MAX_SAMPLE_SIZE * 2);
    }

    #[tokio::test]
    async fn test_truncated_file_is_vanished() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("big.mkv");
        fs::write(&path, vec![3u8; 64]).await.unwrap();

        // Stat'ed at 64 bytes, then cut down to 12 before the samples are read
        let probe = ContentHashProbe::new(32, 8);
        let mut file = fs::File::open(&path).await.unwrap();
        let truncated = fs::OpenOptions::new().write(true).open(&path).await.unwrap();
        truncated.set_len(12).await.unwrap();

        let err = probe.sampled_digest(&mut file, &path, 64).await.unwrap_err();
        assert!(err.is_vanished());
    }

    #[tokio::test]
    async fn test_missing_file_is_vanished() {
        let temp_dir = TempDir::new().unwrap();
        let err = ContentHashProbe::default()
            .hash_file(&temp_dir.path().join("nope"))
            .await
            .unwrap_err();
        assert!(err.is_vanished());
    }
}
