//! Shared context handed to every component that needs the local identity or
//! one of the external primitives. A single owned object rather than ambient
//! globals, so multiple simulated clients can coexist in one process and tear
//! down cleanly.

use std::sync::Arc;

use workflo_media::{IceConfig, MediaDevices, TransportFactory};
use workflo_shared::types::UserId;
use workflo_store::{BlobStore, LogStore};

/// Everything a coordinator needs about its environment.
#[derive(Clone)]
pub struct ChatContext {
    /// The locally signed-in participant.
    pub local_user: UserId,

    /// Durable ordered log store (append + snapshot subscription).
    pub log: Arc<dyn LogStore>,

    /// Blob store for media attachments.
    pub blobs: Arc<dyn BlobStore>,

    /// Local media device source.
    pub devices: Arc<dyn MediaDevices>,

    /// Peer transport constructor.
    pub transports: Arc<dyn TransportFactory>,

    /// Relay/reflection configuration for new transports.
    pub ice: IceConfig,
}

impl ChatContext {
    pub fn new(
        local_user: UserId,
        log: Arc<dyn LogStore>,
        blobs: Arc<dyn BlobStore>,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
    ) -> Self {
        Self {
            local_user,
            log,
            blobs,
            devices,
            transports,
            ice: IceConfig::default(),
        }
    }
}
