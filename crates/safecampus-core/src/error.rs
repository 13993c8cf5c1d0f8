use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    #[error("Unexpected status {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to install asset {url}: {reason}")]
    AssetInstallFailure { url: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Errors surfaced by the platform geolocation provider.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Position unavailable")]
    PositionUnavailable,

    #[error("Timed out acquiring location")]
    Timeout,
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Maximum length for error details carried in `WorkerError` values
const MAX_ERROR_DETAIL_LENGTH: usize = 500;

impl WorkerError {
    /// Truncate an error detail to avoid logging excessive data
    pub(crate) fn truncate_detail(detail: &str) -> String {
        if detail.len() <= MAX_ERROR_DETAIL_LENGTH {
            detail.to_string()
        } else {
            let mut end = MAX_ERROR_DETAIL_LENGTH;
            while !detail.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &detail[..end], detail.len())
        }
    }

    pub fn network(detail: impl AsRef<str>) -> Self {
        WorkerError::NetworkUnavailable(Self::truncate_detail(detail.as_ref()))
    }

    pub fn storage(detail: impl AsRef<str>) -> Self {
        WorkerError::Storage(Self::truncate_detail(detail.as_ref()))
    }

    pub fn delivery(detail: impl AsRef<str>) -> Self {
        WorkerError::Delivery(Self::truncate_detail(detail.as_ref()))
    }

    /// Whether strategy fallback or queueing may recover from this error.
    pub fn is_network(&self) -> bool {
        matches!(self, WorkerError::NetworkUnavailable(_))
    }
}

impl From<std::io::Error> for WorkerError {
    fn from(e: std::io::Error) -> Self {
        WorkerError::storage(e.to_string())
    }
}

impl From<serde_json::Error> for WorkerError {
    fn from(e: serde_json::Error) -> Self {
        WorkerError::storage(e.to_string())
    }
}
