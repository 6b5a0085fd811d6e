use std::{error::Error, fmt};

#[allow(dead_code)]
#[derive(Debug)]
pub enum GalleryError {
    ConfigError(String),
    NetworkError(String),
    StorageError(String),
    /// A storage backend could not enumerate its entries.
    BackendUnavailable(String),
    /// Request referenced an id outside the catalog.
    InvalidId(i64),
    /// No file on disk carries the entry's capture timestamp.
    FileNotResolved(String),
    StreamReadFailed(String),
    StreamTruncated { expected: u64, read: u64 },
    ListenSocketFault(String),
}

impl fmt::Display for GalleryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GalleryError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            GalleryError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            GalleryError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            GalleryError::BackendUnavailable(msg) => write!(f, "Backend unavailable: {}", msg),
            GalleryError::InvalidId(id) => write!(f, "Invalid content id: {}", id),
            GalleryError::FileNotResolved(msg) => write!(f, "File not resolved: {}", msg),
            GalleryError::StreamReadFailed(msg) => write!(f, "Stream read failed: {}", msg),
            GalleryError::StreamTruncated { expected, read } => write!(
                f,
                "Stream truncated: read {} of {} bytes",
                read, expected
            ),
            GalleryError::ListenSocketFault(msg) => write!(f, "Listen socket fault: {}", msg),
        }
    }
}

impl Error for GalleryError {}
