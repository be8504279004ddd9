//! Call signaling state machine.
//!
//! One [`CallSession`] models the whole lifecycle of a peer-to-peer call.
//! Transitions are an exhaustive table over `(state, event)`; any combination
//! without a defined outcome is an explicit [`CallAction::Ignore`], which is
//! what makes double-accept and double-hangup harmless. The machine is pure:
//! it decides, the controller executes (media acquisition, transport calls,
//! signaling publishes).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use workflo_shared::protocol::{IceCandidate, SessionDescription, TerminationReason};
use workflo_shared::types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Caller,
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Idle,
    /// Offer published, awaiting the answer.
    Calling,
    /// Offer received, awaiting local accept or decline.
    Ringing,
    Active,
    Ended,
    Rejected,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Rejected | Self::Failed)
    }
}

/// Inputs the controller feeds into the machine.
#[derive(Debug)]
pub enum CallEvent {
    /// Local user accepts the ringing call.
    Accept,
    /// Local user declines the ringing call.
    Decline,
    /// Remote answer arrived.
    AnswerReceived(SessionDescription),
    /// Remote ICE candidate arrived.
    CandidateReceived(IceCandidate),
    /// Local hang-up.
    HangUp,
    /// Remote peer hung up (or cancelled while ringing).
    RemoteHangUp,
    /// Remote peer declined or signalled line-busy.
    RemoteReject,
    /// Transport or SDP/ICE negotiation failed.
    NegotiationFailed,
}

/// What the controller must do next.
#[derive(Debug, PartialEq, Eq)]
pub enum CallAction {
    /// Callee accepted: acquire media, apply the stored remote offer to the
    /// transport, send back an answer.
    Proceed { remote_offer: SessionDescription },
    /// Apply the remote answer to the transport, then flush buffered
    /// candidates.
    ApplyAnswer(SessionDescription),
    /// Apply the candidate to the transport now.
    ApplyCandidate(IceCandidate),
    /// Candidate buffered until the remote description is applied; a
    /// transport cannot accept candidates before it has one.
    CandidateBuffered,
    /// Tear everything down; `signal` is the termination event to publish to
    /// the peer, if any.
    Terminate { signal: Option<TerminationReason> },
    /// Defined no-op.
    Ignore,
}

/// State for the single call a client may have in flight.
#[derive(Debug)]
pub struct CallSession {
    pub id: Uuid,
    pub local: UserId,
    pub remote: UserId,
    pub role: CallRole,
    state: CallState,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    pending_remote_candidates: VecDeque<IceCandidate>,
    remote_applied: bool,
}

impl CallSession {
    /// `Idle → Calling`: local media is acquired and the offer published by
    /// the controller before this session exists.
    pub fn caller(local: UserId, remote: UserId, offer: SessionDescription) -> Self {
        debug!(remote = %remote, "Call session opened (caller)");
        Self {
            id: Uuid::new_v4(),
            local,
            remote,
            role: CallRole::Caller,
            state: CallState::Calling,
            local_description: Some(offer),
            remote_description: None,
            pending_remote_candidates: VecDeque::new(),
            remote_applied: false,
        }
    }

    /// `Idle → Ringing`: an offer arrived and no other session is active.
    pub fn callee(id: Uuid, local: UserId, remote: UserId, offer: SessionDescription) -> Self {
        debug!(remote = %remote, "Call session opened (callee)");
        Self {
            id,
            local,
            remote,
            role: CallRole::Callee,
            state: CallState::Ringing,
            local_description: None,
            remote_description: Some(offer),
            pending_remote_candidates: VecDeque::new(),
            remote_applied: false,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn set_local_description(&mut self, description: SessionDescription) {
        self.local_description = Some(description);
    }

    /// The controller calls this once the transport has accepted the remote
    /// description, unlocking candidate application.
    pub fn mark_remote_applied(&mut self) {
        self.remote_applied = true;
    }

    /// Candidates buffered before the remote description landed, in arrival
    /// order. Flushed by the controller immediately after
    /// [`mark_remote_applied`](Self::mark_remote_applied).
    pub fn drain_pending_candidates(&mut self) -> Vec<IceCandidate> {
        self.pending_remote_candidates.drain(..).collect()
    }

    pub fn pending_candidate_count(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    /// The transition table.
    pub fn handle(&mut self, event: CallEvent) -> CallAction {
        use CallEvent::*;
        use CallState::*;

        match (self.state, event) {
            // --- Answer path (caller) ---
            (Calling, AnswerReceived(description)) => {
                self.remote_description = Some(description.clone());
                self.state = Active;
                debug!(remote = %self.remote, "Answer received, call active");
                CallAction::ApplyAnswer(description)
            }
            (Ringing | Active, AnswerReceived(_)) => CallAction::Ignore,

            // --- Accept path (callee) ---
            (Ringing, Accept) => {
                self.state = Active;
                debug!(remote = %self.remote, "Call accepted");
                // callee() stores the offer at construction
                match self.remote_description.clone() {
                    Some(remote_offer) => CallAction::Proceed { remote_offer },
                    None => {
                        warn!("Ringing session without stored offer");
                        self.state = Failed;
                        CallAction::Terminate {
                            signal: Some(TerminationReason::Failed),
                        }
                    }
                }
            }
            (Calling | Active, Accept) => CallAction::Ignore,

            (Ringing, Decline) => {
                self.state = Rejected;
                CallAction::Terminate {
                    signal: Some(TerminationReason::Declined),
                }
            }
            (Calling | Active, Decline) => CallAction::Ignore,

            // --- Candidates: buffer until the remote description is applied ---
            (Calling | Ringing | Active, CandidateReceived(candidate)) => {
                if self.remote_applied {
                    CallAction::ApplyCandidate(candidate)
                } else {
                    self.pending_remote_candidates.push_back(candidate);
                    CallAction::CandidateBuffered
                }
            }

            // --- Termination ---
            (Calling | Ringing | Active, HangUp) => {
                self.state = Ended;
                CallAction::Terminate {
                    signal: Some(TerminationReason::Hangup),
                }
            }
            (Calling | Ringing | Active, RemoteHangUp) => {
                self.state = Ended;
                CallAction::Terminate { signal: None }
            }
            (Calling | Ringing | Active, RemoteReject) => {
                self.state = Rejected;
                CallAction::Terminate { signal: None }
            }
            (Calling | Ringing | Active, NegotiationFailed) => {
                self.state = Failed;
                CallAction::Terminate {
                    signal: Some(TerminationReason::Failed),
                }
            }

            // --- Terminal states and Idle ignore everything ---
            (Ended | Rejected | Failed | Idle, _) => CallAction::Ignore,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer() -> SessionDescription {
        SessionDescription::offer("v=0 offer")
    }

    fn answer() -> SessionDescription {
        SessionDescription::answer("v=0 answer")
    }

    fn candidate(n: u32) -> IceCandidate {
        IceCandidate {
            candidate: format!("candidate:{n}"),
            sdp_mid: Some("0".into()),
            sdp_mline_index: Some(0),
        }
    }

    fn caller() -> CallSession {
        CallSession::caller(UserId::from("alice"), UserId::from("bob"), offer())
    }

    fn callee() -> CallSession {
        CallSession::callee(
            Uuid::new_v4(),
            UserId::from("bob"),
            UserId::from("alice"),
            offer(),
        )
    }

    #[test]
    fn test_caller_answer_goes_active() {
        let mut session = caller();
        assert_eq!(session.state(), CallState::Calling);

        let action = session.handle(CallEvent::AnswerReceived(answer()));
        assert_eq!(action, CallAction::ApplyAnswer(answer()));
        assert_eq!(session.state(), CallState::Active);
    }

    #[test]
    fn test_callee_accept_proceeds_with_stored_offer() {
        let mut session = callee();
        assert_eq!(session.state(), CallState::Ringing);

        let action = session.handle(CallEvent::Accept);
        assert_eq!(
            action,
            CallAction::Proceed {
                remote_offer: offer()
            }
        );
        assert_eq!(session.state(), CallState::Active);
    }

    #[test]
    fn test_candidates_buffer_until_remote_applied() {
        let mut session = caller();
        assert_eq!(
            session.handle(CallEvent::CandidateReceived(candidate(1))),
            CallAction::CandidateBuffered
        );
        assert_eq!(
            session.handle(CallEvent::CandidateReceived(candidate(2))),
            CallAction::CandidateBuffered
        );
        assert_eq!(session.pending_candidate_count(), 2);

        session.handle(CallEvent::AnswerReceived(answer()));
        session.mark_remote_applied();
        let flushed = session.drain_pending_candidates();
        assert_eq!(flushed, vec![candidate(1), candidate(2)]);

        // Later candidates apply directly.
        assert_eq!(
            session.handle(CallEvent::CandidateReceived(candidate(3))),
            CallAction::ApplyCandidate(candidate(3))
        );
    }

    #[test]
    fn test_hangup_from_each_live_state() {
        for build in [caller as fn() -> CallSession, callee] {
            let mut session = build();
            let action = session.handle(CallEvent::HangUp);
            assert_eq!(
                action,
                CallAction::Terminate {
                    signal: Some(TerminationReason::Hangup)
                }
            );
            assert_eq!(session.state(), CallState::Ended);
        }
    }

    #[test]
    fn test_double_hangup_is_ignored() {
        let mut session = caller();
        session.handle(CallEvent::HangUp);
        assert_eq!(session.handle(CallEvent::HangUp), CallAction::Ignore);
        assert_eq!(session.state(), CallState::Ended);
    }

    #[test]
    fn test_double_accept_is_ignored() {
        let mut session = callee();
        session.handle(CallEvent::Accept);
        assert_eq!(session.handle(CallEvent::Accept), CallAction::Ignore);
        assert_eq!(session.state(), CallState::Active);
    }

    #[test]
    fn test_decline_while_ringing() {
        let mut session = callee();
        let action = session.handle(CallEvent::Decline);
        assert_eq!(
            action,
            CallAction::Terminate {
                signal: Some(TerminationReason::Declined)
            }
        );
        assert_eq!(session.state(), CallState::Rejected);
    }

    #[test]
    fn test_remote_reject_while_calling() {
        let mut session = caller();
        let action = session.handle(CallEvent::RemoteReject);
        assert_eq!(action, CallAction::Terminate { signal: None });
        assert_eq!(session.state(), CallState::Rejected);
    }

    #[test]
    fn test_negotiation_failure_tears_down_with_signal() {
        let mut session = caller();
        session.handle(CallEvent::AnswerReceived(answer()));
        let action = session.handle(CallEvent::NegotiationFailed);
        assert_eq!(
            action,
            CallAction::Terminate {
                signal: Some(TerminationReason::Failed)
            }
        );
        assert_eq!(session.state(), CallState::Failed);
    }

    #[test]
    fn test_terminal_states_ignore_late_events() {
        let mut session = caller();
        session.handle(CallEvent::HangUp);
        assert_eq!(
            session.handle(CallEvent::AnswerReceived(answer())),
            CallAction::Ignore
        );
        assert_eq!(
            session.handle(CallEvent::CandidateReceived(candidate(9))),
            CallAction::Ignore
        );
        assert_eq!(session.handle(CallEvent::RemoteHangUp), CallAction::Ignore);
    }
}
