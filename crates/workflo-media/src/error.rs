use thiserror::Error;

/// Media device acquisition failures. User-recoverable: shown inline, never
/// retried in a loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("Media device permission denied")]
    PermissionDenied,

    #[error("Media device unavailable: {0}")]
    DeviceUnavailable(String),
}
