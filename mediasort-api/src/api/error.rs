use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Query encoding error: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response shape: {0}")]
    Malformed(String),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Remote error: {0}")]
    Remote(String),
}

impl ApiError {
    /// A paused or unshared Syncthing folder answers `need` with 404.
    pub fn is_not_found(&self) -> bool {
        match self {
            ApiError::NotFound(_) => true,
            ApiError::Server { status, .. } => *status == 404,
            _ => false,
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ApiError::Malformed(message.into())
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
