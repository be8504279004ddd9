use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{MessageRecord, TypingScope, UserId};

/// All events carried on the push channel.
///
/// Serialized as `{"event": "...", "payload": {...}}` with the event names
/// the original socket protocol uses, so a JSON transport can route on the
/// tag alone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "camelCase")]
pub enum PushEvent {
    /// A message was just appended; sent to the receiver so it shows up
    /// before their feed subscription refreshes.
    NewMessage(MessageRecord),

    /// A participant started typing in a scope.
    TypingStart(TypingEvent),

    /// A participant stopped typing in a scope.
    TypingStop(TypingEvent),

    /// Full replacement set of currently-connected participants.
    PresenceSnapshot(PresenceSnapshot),

    /// SDP offer opening a call.
    CallOffer(CallSignal),

    /// SDP answer accepting a call.
    CallAnswer(CallSignal),

    /// ICE candidate exchanged during negotiation.
    IceCandidate(IceCandidateEvent),

    /// Call terminated by hangup or failure.
    CallEnd(CallTermination),

    /// Call declined (or refused line-busy).
    CallReject(CallTermination),
}

impl PushEvent {
    /// The wire tag of this event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "newMessage",
            Self::TypingStart(_) => "typingStart",
            Self::TypingStop(_) => "typingStop",
            Self::PresenceSnapshot(_) => "presenceSnapshot",
            Self::CallOffer(_) => "callOffer",
            Self::CallAnswer(_) => "callAnswer",
            Self::IceCandidate(_) => "iceCandidate",
            Self::CallEnd(_) => "callEnd",
            Self::CallReject(_) => "callReject",
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypingEvent {
    pub scope: TypingScope,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PresenceSnapshot {
    pub online: Vec<UserId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Media capabilities payload for one side of a peer session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Network path descriptor exchanged during transport negotiation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallSignal {
    pub call_id: Uuid,
    pub from: UserId,
    pub to: UserId,
    pub description: SessionDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidateEvent {
    pub call_id: Uuid,
    pub from: UserId,
    pub to: UserId,
    pub candidate: IceCandidate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminationReason {
    Hangup,
    Busy,
    Declined,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallTermination {
    pub call_id: Uuid,
    pub from: UserId,
    pub to: UserId,
    pub reason: TerminationReason,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageKind;

    #[test]
    fn test_push_event_roundtrip() {
        let event = PushEvent::NewMessage(MessageRecord {
            sender_id: UserId::from("a"),
            receiver_id: UserId::from("b"),
            body: "salut".into(),
            kind: MessageKind::Text,
            file_name: None,
            created_at: 1_700_000_000_000,
        });

        let bytes = event.to_bytes().unwrap();
        let restored = PushEvent::from_bytes(&bytes).unwrap();
        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_tag_matches_name() {
        let event = PushEvent::PresenceSnapshot(PresenceSnapshot {
            online: vec![UserId::from("a")],
        });
        let json: serde_json::Value = serde_json::from_slice(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(event.name(), "presenceSnapshot");
    }

    #[test]
    fn test_call_signal_roundtrip() {
        let event = PushEvent::CallOffer(CallSignal {
            call_id: Uuid::new_v4(),
            from: UserId::from("a"),
            to: UserId::from("b"),
            description: SessionDescription::offer("v=0"),
        });
        let restored = PushEvent::from_bytes(&event.to_bytes().unwrap()).unwrap();
        assert_eq!(event, restored);
    }
}
