//! Notifications the coordinator emits for the UI layer to render.

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use workflo_media::CallState;
use workflo_shared::types::{ConversationKey, TypingScope, UserId};

/// State snapshots pushed to the UI. Delivery is best-effort: a renderer
/// that cannot keep up misses intermediate snapshots, not final state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientEvent {
    /// The merged view of a conversation changed; re-read it.
    ConversationUpdated { conversation: ConversationKey },

    /// The online set was replaced.
    PresenceChanged { online: Vec<UserId> },

    /// The set of participants typing in a scope changed.
    TypingChanged {
        scope: TypingScope,
        users: Vec<UserId>,
    },

    /// An offer arrived and the client is now ringing.
    IncomingCall { call_id: Uuid, from: UserId },

    /// The call machine moved to a new state.
    CallStateChanged {
        call_id: Uuid,
        remote: UserId,
        state: CallState,
    },

    /// A message could not be persisted; the user may retry explicitly.
    DeliveryFailed {
        conversation: ConversationKey,
        reason: String,
    },
}

/// Queue an event for the UI, dropping (with a log line) if the renderer
/// cannot keep up.
pub fn emit(tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    if let Err(e) = tx.try_send(event) {
        tracing::warn!(error = %e, "Failed to emit client event");
    }
}
