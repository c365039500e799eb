//! Error types for the decision engine and pipeline

use std::io::ErrorKind;
use std::path::PathBuf;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, StabilityError>;

/// Errors raised by the engine.
///
/// Probe-level failures against optional integrations never surface here;
/// they degrade inside the probe. What remains are filesystem conditions
/// the decider cannot reason around.
#[derive(Debug, thiserror::Error)]
pub enum StabilityError {
    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A file seen earlier in the batch can no longer be read
    #[error("File disappeared during check: '{path}'")]
    FileVanished { path: PathBuf },

    /// Path-related errors
    #[error("Path error at '{path}': {message}")]
    Path { path: PathBuf, message: String },

    /// Hash computation errors
    #[error("Hash computation error for '{path}': {message}")]
    Hash { path: PathBuf, message: String },

    /// Directory scanning errors
    #[error("Directory scan error at '{path}': {message}")]
    DirectoryScan { path: PathBuf, message: String },

    /// Temp-marker pattern errors
    #[error("Pattern error: {0}")]
    Pattern(#[from] globset::Error),

    /// Filename parsing pattern errors
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Move errors
    #[error("Move error from '{source_path}' to '{destination}': {message}")]
    Move {
        source_path: PathBuf,
        destination: PathBuf,
        message: String,
    },

}

/// IO errors that mean a path changed underneath a read: removed, a parent
/// directory swapped for a file, or a file truncated mid-read.
pub fn is_vanishing(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::NotFound | ErrorKind::NotADirectory | ErrorKind::UnexpectedEof
    )
}

impl StabilityError {
    /// Create a new path error
    pub fn path_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Path {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new vanished-file error
    pub fn vanished(path: impl Into<PathBuf>) -> Self {
        Self::FileVanished { path: path.into() }
    }

    /// Create a new hash error
    pub fn hash_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hash {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new directory scan error
    pub fn scan_error(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::DirectoryScan {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new move error
    pub fn move_error(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Move {
            source_path: source.into(),
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Classify an IO error observed while re-reading a known path
    pub fn from_io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        if is_vanishing(error.kind()) {
            Self::vanished(path)
        } else {
            Self::path_error(path, error.to_string())
        }
    }

    pub fn is_vanished(&self) -> bool {
        matches!(self, Self::FileVanished { .. })
    }
}
