use thiserror::Error;

/// Failure of a single network fetch.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request failed with status {status}: {url}")]
    BadStatus { status: u16, url: String },
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Network(err.to_string())
    }
}

/// Failure of a cache storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt storage entry: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Failure reading the external clipboard.
#[derive(Error, Debug)]
pub enum ClipboardError {
    #[error("Clipboard access denied")]
    Denied,

    #[error("Clipboard unavailable: {0}")]
    Unavailable(String),
}

/// Failure adding a fetched response to a cache bucket.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Maximum length for error response bodies in log messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl FetchError {
    /// Build a network error from any displayable source, truncating long messages.
    pub fn network(msg: impl std::fmt::Display) -> Self {
        let msg = msg.to_string();
        if msg.len() <= MAX_ERROR_BODY_LENGTH {
            FetchError::Network(msg)
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !msg.is_char_boundary(end) {
                end -= 1;
            }
            FetchError::Network(format!(
                "{}... (truncated, {} total bytes)",
                &msg[..end],
                msg.len()
            ))
        }
    }
}
