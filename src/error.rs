//! Error types for the media range cache

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Error types that can occur while managing the cache
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Import source not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("Resource already fully cached: {0}")]
    AlreadyCached(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Invalid byte range: {0}")]
    InvalidRange(String),

    #[error("Resource is in use by an active download: {0}")]
    ResourceInUse(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::IoError(err.to_string())
    }
}

impl From<bincode::Error> for CacheError {
    fn from(err: bincode::Error) -> Self {
        CacheError::SerializationError(err.to_string())
    }
}

impl CacheError {
    /// Build an `IoError` that names the path the operation touched
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        CacheError::IoError(format!("{}: {}", path.display(), err))
    }

    /// Whether this error means "nothing was there"
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::SourceNotFound(_))
    }

    /// Determine if the caller can recover by simply fetching the bytes again
    ///
    /// Lost bookkeeping and transient filesystem failures are recoverable:
    /// the resource is re-downloaded. Configuration problems and policy
    /// refusals are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            CacheError::IoError(_) => true,
            CacheError::SerializationError(_) => true,
            CacheError::DownloadFailed(_) => true,
            CacheError::ResourceInUse(_) => true,

            CacheError::ConfigError(_) => false,
            CacheError::SourceNotFound(_) => false,
            CacheError::AlreadyCached(_) => false,
            CacheError::InvalidRange(_) => false,
        }
    }
}
