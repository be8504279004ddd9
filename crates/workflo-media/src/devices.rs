//! Local media device acquisition.
//!
//! A [`LocalStream`] owns the acquired tracks; stopping it is idempotent so
//! teardown paths can release unconditionally without double-release risk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::MediaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    pub fn audio_video() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

#[derive(Debug, Clone)]
pub struct MediaTrack {
    pub id: Uuid,
    pub kind: TrackKind,
}

/// An acquired local capture stream (camera and/or microphone).
#[derive(Debug)]
pub struct LocalStream {
    id: Uuid,
    tracks: Vec<MediaTrack>,
    released: Arc<AtomicBool>,
}

impl LocalStream {
    fn new(constraints: MediaConstraints, released: Arc<AtomicBool>) -> Self {
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack {
                id: Uuid::new_v4(),
                kind: TrackKind::Audio,
            });
        }
        if constraints.video {
            tracks.push(MediaTrack {
                id: Uuid::new_v4(),
                kind: TrackKind::Video,
            });
        }
        Self {
            id: Uuid::new_v4(),
            tracks,
            released,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Stop every track and release the device handles. Safe to call more
    /// than once; only the first call has any effect.
    pub fn stop(&mut self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            info!(stream = %self.id, tracks = self.tracks.len(), "Local media stream stopped");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Acquire a local capture stream matching the constraints.
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError>;
}

/// In-process device source. Tracks every stream it hands out so tests can
/// assert that no camera/microphone handle leaks, and can simulate a denied
/// permission prompt.
#[derive(Default)]
pub struct VirtualDevices {
    denied: AtomicBool,
    handed_out: Mutex<Vec<Arc<AtomicBool>>>,
}

impl VirtualDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the user denying (or re-granting) the device permission.
    pub fn set_denied(&self, denied: bool) {
        self.denied.store(denied, Ordering::SeqCst);
    }

    /// Number of acquired streams not yet stopped.
    pub fn live_stream_count(&self) -> usize {
        self.handed_out
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|released| !released.load(Ordering::SeqCst))
            .count()
    }
}

#[async_trait]
impl MediaDevices for VirtualDevices {
    async fn acquire(&self, constraints: MediaConstraints) -> Result<LocalStream, MediaError> {
        if self.denied.load(Ordering::SeqCst) {
            return Err(MediaError::PermissionDenied);
        }

        let released = Arc::new(AtomicBool::new(false));
        self.handed_out
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(released.clone());

        let stream = LocalStream::new(constraints, released);
        debug!(stream = %stream.id(), audio = constraints.audio, video = constraints.video, "Media stream acquired");
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_and_stop() {
        let devices = VirtualDevices::new();
        let mut stream = devices
            .acquire(MediaConstraints::audio_video())
            .await
            .unwrap();
        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(devices.live_stream_count(), 1);

        stream.stop();
        assert!(stream.is_stopped());
        assert_eq!(devices.live_stream_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let devices = VirtualDevices::new();
        let mut stream = devices
            .acquire(MediaConstraints::audio_only())
            .await
            .unwrap();
        stream.stop();
        stream.stop();
        assert_eq!(devices.live_stream_count(), 0);
    }

    #[tokio::test]
    async fn test_denied_permission() {
        let devices = VirtualDevices::new();
        devices.set_denied(true);
        let err = devices
            .acquire(MediaConstraints::audio_only())
            .await
            .unwrap_err();
        assert_eq!(err, MediaError::PermissionDenied);
        assert_eq!(devices.live_stream_count(), 0);
    }
}
