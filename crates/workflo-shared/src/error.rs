use thiserror::Error;

use crate::types::UserId;

/// Top-level error for coordinator operations.
#[derive(Error, Debug)]
pub enum WorkfloError {
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Push-channel failures. Delivery is best-effort, so most call sites log
/// these rather than propagate them.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Not connected to the push channel")]
    Disconnected,

    #[error("Target participant {0} is not connected")]
    TargetUnknown(UserId),

    #[error("Event queue full, event dropped")]
    QueueFull,
}
