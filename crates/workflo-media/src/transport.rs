//! Peer transport abstraction.
//!
//! The transport is the given negotiation primitive: it produces and consumes
//! session descriptions and ICE candidates. The invariant that matters to the
//! coordinator is enforced here: candidates are refused until a remote
//! description has been applied.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use workflo_shared::constants::DEFAULT_STUN_SERVER;
use workflo_shared::protocol::{IceCandidate, SessionDescription};

use crate::devices::LocalStream;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid transport state: {0}")]
    InvalidState(&'static str),

    #[error("SDP error: {0}")]
    Sdp(String),

    #[error("ICE error: {0}")]
    Ice(String),

    #[error("Transport closed")]
    Closed,
}

/// Relay/reflection server configuration for transport construction.
#[derive(Debug, Clone)]
pub struct IceConfig {
    pub stun_servers: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

#[async_trait]
pub trait PeerTransport: Send {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError>;

    /// Only valid once a remote offer has been applied.
    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    /// Refused with `InvalidState` before the remote description is applied.
    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError>;

    /// Attach the local capture tracks to the outgoing side.
    fn attach_stream(&mut self, stream: &LocalStream);

    /// Locally gathered candidates not yet handed to the signaling layer.
    fn drain_local_candidates(&mut self) -> Vec<IceCandidate>;

    /// Close the transport. Idempotent.
    async fn close(&mut self);

    fn is_closed(&self) -> bool;
}

pub trait TransportFactory: Send + Sync {
    fn create(&self, config: &IceConfig) -> Box<dyn PeerTransport>;
}

/// In-process transport producing deterministic descriptions and candidates.
pub struct LoopbackTransport {
    id: Uuid,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    gathered: Vec<IceCandidate>,
    attached_tracks: usize,
    closed: bool,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            local_description: None,
            remote_description: None,
            applied_candidates: Vec::new(),
            gathered: Vec::new(),
            attached_tracks: 0,
            closed: false,
        }
    }

    pub fn applied_candidates(&self) -> &[IceCandidate] {
        &self.applied_candidates
    }

    pub fn attached_tracks(&self) -> usize {
        self.attached_tracks
    }

    fn gather(&mut self) {
        // A host candidate and a reflexive one, like a minimal real gather.
        self.gathered.push(IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 192.168.1.10 50000 typ host", self.id),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        });
        self.gathered.push(IceCandidate {
            candidate: format!("candidate:{} 1 udp 1686052607 203.0.113.7 50000 typ srflx", self.id),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        });
    }

    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed {
            Err(TransportError::Closed)
        } else {
            Ok(())
        }
    }
}

impl Default for LoopbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn create_offer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        let description = SessionDescription::offer(format!("v=0 o=- {} offer", self.id));
        self.local_description = Some(description.clone());
        self.gather();
        Ok(description)
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        self.ensure_open()?;
        if self.remote_description.is_none() {
            return Err(TransportError::InvalidState(
                "create_answer before remote description",
            ));
        }
        let description = SessionDescription::answer(format!("v=0 o=- {} answer", self.id));
        self.local_description = Some(description.clone());
        self.gather();
        Ok(description)
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        if description.sdp.is_empty() {
            return Err(TransportError::Sdp("empty description".into()));
        }
        self.remote_description = Some(description);
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), TransportError> {
        self.ensure_open()?;
        if self.remote_description.is_none() {
            return Err(TransportError::InvalidState(
                "candidate before remote description",
            ));
        }
        self.applied_candidates.push(candidate);
        Ok(())
    }

    fn attach_stream(&mut self, stream: &LocalStream) {
        self.attached_tracks += stream.tracks().len();
    }

    fn drain_local_candidates(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.gathered)
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            debug!(transport = %self.id, "Transport closed");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Factory for [`LoopbackTransport`]s; counts constructions for tests.
#[derive(Default)]
pub struct LoopbackFactory {
    created: Arc<AtomicUsize>,
}

impl LoopbackFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl TransportFactory for LoopbackFactory {
    fn create(&self, _config: &IceConfig) -> Box<dyn PeerTransport> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Box::new(LoopbackTransport::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_candidate_refused_before_remote_description() {
        let mut transport = LoopbackTransport::new();
        let candidate = IceCandidate {
            candidate: "candidate:x".into(),
            sdp_mid: None,
            sdp_mline_index: None,
        };
        let err = transport.add_ice_candidate(candidate.clone()).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidState(_)));

        transport
            .set_remote_description(SessionDescription::offer("v=0"))
            .await
            .unwrap();
        transport.add_ice_candidate(candidate).await.unwrap();
        assert_eq!(transport.applied_candidates().len(), 1);
    }

    #[tokio::test]
    async fn test_answer_requires_remote_offer() {
        let mut transport = LoopbackTransport::new();
        assert!(transport.create_answer().await.is_err());

        transport
            .set_remote_description(SessionDescription::offer("v=0"))
            .await
            .unwrap();
        let answer = transport.create_answer().await.unwrap();
        assert_eq!(answer.kind, workflo_shared::protocol::SdpKind::Answer);
        assert!(!transport.drain_local_candidates().is_empty());
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_everything() {
        let mut transport = LoopbackTransport::new();
        transport.close().await;
        transport.close().await;
        assert!(transport.is_closed());
        assert!(matches!(
            transport.create_offer().await,
            Err(TransportError::Closed)
        ));
    }
}
