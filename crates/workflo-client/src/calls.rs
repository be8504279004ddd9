//! Call controller.
//!
//! Owns the single [`CallSession`] a client may have in flight, plus the
//! acquired media stream and the peer transport. The session machine decides
//! every transition; this controller performs the side effects: device
//! acquisition, transport calls, signaling publishes and teardown. Teardown
//! runs on every exit path and is idempotent, so no error can leak a
//! camera/microphone handle or a transport.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use workflo_media::devices::{LocalStream, MediaConstraints};
use workflo_media::{
    CallAction, CallEvent, CallSession, CallState, IceConfig, MediaDevices, MediaError,
    PeerTransport, TransportError, TransportFactory,
};
use workflo_net::{PresenceTracker, PushSender};
use workflo_shared::protocol::{
    CallSignal, CallTermination, IceCandidateEvent, PushEvent, SessionDescription,
    TerminationReason,
};
use workflo_shared::types::UserId;

use crate::events::{emit, ClientEvent};

#[derive(Error, Debug)]
pub enum CallError {
    /// Device permission or hardware unavailable. User-recoverable.
    #[error("Media acquisition failed: {0}")]
    Media(#[from] MediaError),

    /// A call is already active on this client.
    #[error("Already in a call")]
    Busy,

    /// The target is absent from the presence set; nothing was signalled.
    #[error("Participant {0} is not online")]
    Offline(UserId),

    /// Transport/SDP/ICE failure; the call was torn down.
    #[error("Negotiation failed: {0}")]
    Negotiation(#[from] TransportError),
}

pub struct CallController {
    local: UserId,
    push: PushSender,
    devices: Arc<dyn MediaDevices>,
    transports: Arc<dyn TransportFactory>,
    ice: IceConfig,
    events_tx: mpsc::Sender<ClientEvent>,
    session: Option<CallSession>,
    stream: Option<LocalStream>,
    transport: Option<Box<dyn PeerTransport>>,
}

impl CallController {
    pub fn new(
        local: UserId,
        push: PushSender,
        devices: Arc<dyn MediaDevices>,
        transports: Arc<dyn TransportFactory>,
        ice: IceConfig,
        events_tx: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            local,
            push,
            devices,
            transports,
            ice,
            events_tx,
            session: None,
            stream: None,
            transport: None,
        }
    }

    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(CallState::Idle)
    }

    pub fn remote(&self) -> Option<&UserId> {
        self.session.as_ref().map(|s| &s.remote)
    }

    /// `Idle → Calling`. Fails fast before any signaling when the target is
    /// offline; a denied media prompt leaves everything released.
    pub async fn initiate(
        &mut self,
        remote: &UserId,
        constraints: MediaConstraints,
        presence: &PresenceTracker,
    ) -> Result<Uuid, CallError> {
        if self.session.is_some() {
            return Err(CallError::Busy);
        }
        if !presence.is_online(remote) {
            return Err(CallError::Offline(remote.clone()));
        }

        let stream = self.devices.acquire(constraints).await?;
        let mut transport = self.transports.create(&self.ice);
        transport.attach_stream(&stream);

        let offer = match transport.create_offer().await {
            Ok(offer) => offer,
            Err(e) => {
                release(stream, transport).await;
                return Err(e.into());
            }
        };

        let session = CallSession::caller(self.local.clone(), remote.clone(), offer.clone());
        let call_id = session.id;
        let signal = PushEvent::CallOffer(CallSignal {
            call_id,
            from: self.local.clone(),
            to: remote.clone(),
            description: offer,
        });
        if let Err(e) = self.push.publish(signal, Some(remote)) {
            warn!(remote = %remote, error = %e, "Offer publish failed");
            release(stream, transport).await;
            return Err(CallError::Offline(remote.clone()));
        }

        self.stream = Some(stream);
        self.transport = Some(transport);
        self.session = Some(session);
        self.publish_local_candidates();
        info!(call = %call_id, remote = %remote, "Call initiated");
        self.emit_state();
        Ok(call_id)
    }

    /// `Idle → Ringing`, or an automatic line-busy reject when a session
    /// already exists.
    pub fn handle_offer(&mut self, signal: CallSignal) {
        if self.session.is_some() {
            info!(from = %signal.from, "Inbound offer while in a call, signalling busy");
            let reject = PushEvent::CallReject(CallTermination {
                call_id: signal.call_id,
                from: self.local.clone(),
                to: signal.from.clone(),
                reason: TerminationReason::Busy,
            });
            if let Err(e) = self.push.publish(reject, Some(&signal.from)) {
                debug!(error = %e, "Busy signal dropped");
            }
            return;
        }

        let session = CallSession::callee(
            signal.call_id,
            self.local.clone(),
            signal.from.clone(),
            signal.description,
        );
        info!(call = %session.id, from = %signal.from, "Incoming call");
        emit(
            &self.events_tx,
            ClientEvent::IncomingCall {
                call_id: session.id,
                from: signal.from,
            },
        );
        self.session = Some(session);
        self.emit_state();
    }

    /// `Ringing → Active`: acquire media, apply the stored offer, answer.
    /// A second accept on the same session is a defined no-op.
    pub async fn accept(&mut self, constraints: MediaConstraints) -> Result<(), CallError> {
        let (action, call_id, remote) = match self.session.as_mut() {
            Some(session) => (
                session.handle(CallEvent::Accept),
                session.id,
                session.remote.clone(),
            ),
            None => return Ok(()),
        };

        match action {
            CallAction::Proceed { remote_offer } => {
                let stream = match self.devices.acquire(constraints).await {
                    Ok(stream) => stream,
                    Err(e) => {
                        // The caller must not ring forever: terminate as
                        // failed with full teardown.
                        self.fail().await;
                        return Err(e.into());
                    }
                };
                let mut transport = self.transports.create(&self.ice);
                transport.attach_stream(&stream);
                self.stream = Some(stream);
                self.transport = Some(transport);

                let answer = match self.negotiate_answer(remote_offer).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        self.fail().await;
                        return Err(e.into());
                    }
                };
                if let Some(session) = self.session.as_mut() {
                    session.set_local_description(answer.clone());
                }

                let signal = PushEvent::CallAnswer(CallSignal {
                    call_id,
                    from: self.local.clone(),
                    to: remote.clone(),
                    description: answer,
                });
                if let Err(e) = self.push.publish(signal, Some(&remote)) {
                    warn!(remote = %remote, error = %e, "Answer publish failed");
                    self.fail().await;
                    return Err(CallError::Offline(remote));
                }
                self.publish_local_candidates();
                info!(call = %call_id, remote = %remote, "Call accepted");
                self.emit_state();
                Ok(())
            }
            CallAction::Terminate { signal } => {
                self.terminate(signal).await;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// `Calling → Active` on the remote answer.
    pub async fn handle_answer(&mut self, signal: CallSignal) {
        let action = match self.session.as_mut() {
            Some(session) if session.id == signal.call_id => {
                session.handle(CallEvent::AnswerReceived(signal.description))
            }
            _ => {
                debug!(call = %signal.call_id, "Answer for unknown call ignored");
                return;
            }
        };

        match action {
            CallAction::ApplyAnswer(description) => {
                if let Err(e) = self.apply_remote(description).await {
                    warn!(error = %e, "Applying remote answer failed");
                    self.fail().await;
                    return;
                }
                info!("Call active");
                self.emit_state();
            }
            CallAction::Terminate { signal } => self.terminate(signal).await,
            _ => {}
        }
    }

    /// Buffer or apply a remote candidate, per the machine's decision.
    pub async fn handle_candidate(&mut self, event: IceCandidateEvent) {
        let action = match self.session.as_mut() {
            Some(session) if session.id == event.call_id => {
                session.handle(CallEvent::CandidateReceived(event.candidate))
            }
            _ => return,
        };

        match action {
            CallAction::ApplyCandidate(candidate) => {
                let failed = match self.transport.as_mut() {
                    Some(transport) => transport.add_ice_candidate(candidate).await.is_err(),
                    None => false,
                };
                if failed {
                    warn!("Applying remote candidate failed");
                    self.fail().await;
                }
            }
            CallAction::CandidateBuffered => {
                debug!("Remote candidate buffered until remote description");
            }
            _ => {}
        }
    }

    /// Local hang-up. Idempotent: with no session in flight this is a no-op.
    pub async fn hang_up(&mut self) {
        self.feed(CallEvent::HangUp).await;
    }

    /// Decline a ringing call.
    pub async fn decline(&mut self) {
        self.feed(CallEvent::Decline).await;
    }

    pub async fn handle_remote_end(&mut self, term: CallTermination) {
        if self.matches(term.call_id) {
            self.feed(CallEvent::RemoteHangUp).await;
        }
    }

    pub async fn handle_remote_reject(&mut self, term: CallTermination) {
        if self.matches(term.call_id) {
            self.feed(CallEvent::RemoteReject).await;
        }
    }

    fn matches(&self, call_id: Uuid) -> bool {
        self.session.as_ref().is_some_and(|s| s.id == call_id)
    }

    async fn feed(&mut self, event: CallEvent) {
        let action = match self.session.as_mut() {
            Some(session) => session.handle(event),
            None => return,
        };
        if let CallAction::Terminate { signal } = action {
            self.terminate(signal).await;
        }
    }

    async fn fail(&mut self) {
        self.feed(CallEvent::NegotiationFailed).await;
    }

    /// Apply a remote description, then flush every candidate buffered while
    /// the transport could not accept them.
    async fn apply_remote(&mut self, description: SessionDescription) -> Result<(), TransportError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(TransportError::Closed);
        };
        transport.set_remote_description(description).await?;

        if let Some(session) = self.session.as_mut() {
            session.mark_remote_applied();
            let pending = session.drain_pending_candidates();
            if !pending.is_empty() {
                debug!(count = pending.len(), "Flushing buffered candidates");
            }
            for candidate in pending {
                transport.add_ice_candidate(candidate).await?;
            }
        }
        Ok(())
    }

    async fn negotiate_answer(
        &mut self,
        remote_offer: SessionDescription,
    ) -> Result<SessionDescription, TransportError> {
        self.apply_remote(remote_offer).await?;
        match self.transport.as_mut() {
            Some(transport) => transport.create_answer().await,
            None => Err(TransportError::Closed),
        }
    }

    /// Hand locally gathered candidates to the peer.
    fn publish_local_candidates(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let Some(transport) = self.transport.as_mut() else {
            return;
        };
        for candidate in transport.drain_local_candidates() {
            let event = PushEvent::IceCandidate(IceCandidateEvent {
                call_id: session.id,
                from: self.local.clone(),
                to: session.remote.clone(),
                candidate,
            });
            if let Err(e) = self.push.publish(event, Some(&session.remote)) {
                debug!(error = %e, "Local candidate dropped");
            }
        }
    }

    /// Release every resource the call holds. Runs exactly once per session;
    /// the session is consumed so a second terminal event finds nothing to
    /// release or re-publish.
    async fn terminate(&mut self, signal: Option<TerminationReason>) {
        let Some(session) = self.session.take() else {
            return;
        };
        let final_state = session.state();

        if let Some(reason) = signal {
            let term = CallTermination {
                call_id: session.id,
                from: self.local.clone(),
                to: session.remote.clone(),
                reason,
            };
            let event = match reason {
                TerminationReason::Declined | TerminationReason::Busy => {
                    PushEvent::CallReject(term)
                }
                TerminationReason::Hangup | TerminationReason::Failed => PushEvent::CallEnd(term),
            };
            if let Err(e) = self.push.publish(event, Some(&session.remote)) {
                debug!(error = %e, "Termination signal dropped");
            }
        }

        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
        }

        info!(call = %session.id, state = ?final_state, "Call terminated");
        emit(
            &self.events_tx,
            ClientEvent::CallStateChanged {
                call_id: session.id,
                remote: session.remote.clone(),
                state: final_state,
            },
        );
    }

    fn emit_state(&self) {
        if let Some(session) = &self.session {
            emit(
                &self.events_tx,
                ClientEvent::CallStateChanged {
                    call_id: session.id,
                    remote: session.remote.clone(),
                    state: session.state(),
                },
            );
        }
    }
}

async fn release(mut stream: LocalStream, mut transport: Box<dyn PeerTransport>) {
    transport.close().await;
    stream.stop();
}
