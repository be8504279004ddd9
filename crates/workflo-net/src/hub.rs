//! In-process push hub with the routing contract of the remote event server:
//! connecting announces the participant and triggers a presence broadcast,
//! `publish` delivers to one target or to everyone except the sender, and
//! delivery is fire-and-forget.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use workflo_shared::constants::PUSH_QUEUE_CAPACITY;
use workflo_shared::error::ChannelError;
use workflo_shared::protocol::{PresenceSnapshot, PushEvent};
use workflo_shared::types::UserId;

struct HubInner {
    clients: HashMap<UserId, mpsc::Sender<PushEvent>>,
}

/// The shared hub. Cheap to clone; all clients of one hub see each other.
#[derive(Clone)]
pub struct PushHub {
    inner: Arc<Mutex<HubInner>>,
}

impl PushHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                clients: HashMap::new(),
            })),
        }
    }

    /// Register a participant and hand back its publish handle plus the
    /// receiving end of its event queue. Everyone (the newcomer included)
    /// gets a fresh presence snapshot.
    pub fn connect(&self, user: &UserId) -> (PushSender, mpsc::Receiver<PushEvent>) {
        let (tx, rx) = mpsc::channel(PUSH_QUEUE_CAPACITY);
        {
            let mut inner = self.lock();
            inner.clients.insert(user.clone(), tx);
            info!(user = %user, count = inner.clients.len(), "Participant connected");
            Self::broadcast_presence(&mut inner);
        }
        (
            PushSender {
                user: user.clone(),
                hub: self.clone(),
            },
            rx,
        )
    }

    /// Remove a participant and rebroadcast presence.
    pub fn disconnect(&self, user: &UserId) {
        let mut inner = self.lock();
        if inner.clients.remove(user).is_some() {
            info!(user = %user, "Participant disconnected");
            Self::broadcast_presence(&mut inner);
        }
    }

    /// Current online set, as the next broadcast would report it.
    pub fn online(&self) -> Vec<UserId> {
        let mut online: Vec<UserId> = self.lock().clients.keys().cloned().collect();
        online.sort();
        online
    }

    fn publish(
        &self,
        from: &UserId,
        event: PushEvent,
        target: Option<&UserId>,
    ) -> Result<(), ChannelError> {
        let mut inner = self.lock();
        if !inner.clients.contains_key(from) {
            return Err(ChannelError::Disconnected);
        }

        let mut dead = Vec::new();
        match target {
            Some(to) => {
                let Some(tx) = inner.clients.get(to) else {
                    debug!(event = event.name(), to = %to, "Target offline, event dropped");
                    return Err(ChannelError::TargetUnknown(to.clone()));
                };
                match tx.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(event = event.name(), to = %to, "Queue full, event dropped");
                        return Err(ChannelError::QueueFull);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(to.clone()),
                }
            }
            None => {
                for (user, tx) in &inner.clients {
                    if user == from {
                        continue;
                    }
                    match tx.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(mpsc::error::TrySendError::Full(_)) => {
                            warn!(event = event.name(), to = %user, "Queue full, event dropped");
                        }
                        Err(mpsc::error::TrySendError::Closed(_)) => dead.push(user.clone()),
                    }
                }
            }
        }

        if !dead.is_empty() {
            for user in &dead {
                inner.clients.remove(user);
                info!(user = %user, "Evicted client with closed queue");
            }
            Self::broadcast_presence(&mut inner);
        }
        Ok(())
    }

    fn broadcast_presence(inner: &mut HubInner) {
        let mut online: Vec<UserId> = inner.clients.keys().cloned().collect();
        online.sort();
        let event = PushEvent::PresenceSnapshot(PresenceSnapshot { online });
        for (user, tx) in &inner.clients {
            if tx.try_send(event.clone()).is_err() {
                debug!(user = %user, "Presence snapshot delivery skipped");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Publish handle for one connected participant.
#[derive(Clone)]
pub struct PushSender {
    user: UserId,
    hub: PushHub,
}

impl PushSender {
    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Send an event to one participant, or broadcast to everyone else.
    pub fn publish(&self, event: PushEvent, target: Option<&UserId>) -> Result<(), ChannelError> {
        self.hub.publish(&self.user, event, target)
    }

    pub fn disconnect(&self) {
        self.hub.disconnect(&self.user);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflo_shared::protocol::TypingEvent;
    use workflo_shared::types::{ConversationKey, TypingScope};

    fn typing_event(from: &UserId, to: &UserId) -> PushEvent {
        PushEvent::TypingStart(TypingEvent {
            scope: TypingScope::Conversation(ConversationKey::resolve(from, to)),
            user_id: from.clone(),
        })
    }

    #[tokio::test]
    async fn test_connect_broadcasts_presence_to_everyone() {
        let hub = PushHub::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        let (_a_tx, mut a_rx) = hub.connect(&alice);
        // Alice's own connect snapshot
        assert!(matches!(
            a_rx.recv().await.unwrap(),
            PushEvent::PresenceSnapshot(ref s) if s.online == vec![alice.clone()]
        ));

        let (_b_tx, mut b_rx) = hub.connect(&bob);
        let expected = vec![alice.clone(), bob.clone()];
        assert!(matches!(
            a_rx.recv().await.unwrap(),
            PushEvent::PresenceSnapshot(ref s) if s.online == expected
        ));
        assert!(matches!(
            b_rx.recv().await.unwrap(),
            PushEvent::PresenceSnapshot(ref s) if s.online == expected
        ));
    }

    #[tokio::test]
    async fn test_targeted_publish_reaches_only_target() {
        let hub = PushHub::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");
        let carol = UserId::from("carol");

        let (a_tx, _a_rx) = hub.connect(&alice);
        let (_b_tx, mut b_rx) = hub.connect(&bob);
        let (_c_tx, mut c_rx) = hub.connect(&carol);

        // Drain presence noise
        while matches!(b_rx.try_recv(), Ok(PushEvent::PresenceSnapshot(_))) {}
        while matches!(c_rx.try_recv(), Ok(PushEvent::PresenceSnapshot(_))) {}

        a_tx.publish(typing_event(&alice, &bob), Some(&bob)).unwrap();
        assert!(matches!(b_rx.try_recv(), Ok(PushEvent::TypingStart(_))));
        assert!(c_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_skips_sender() {
        let hub = PushHub::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        let (a_tx, mut a_rx) = hub.connect(&alice);
        let (_b_tx, mut b_rx) = hub.connect(&bob);
        while matches!(a_rx.try_recv(), Ok(PushEvent::PresenceSnapshot(_))) {}
        while matches!(b_rx.try_recv(), Ok(PushEvent::PresenceSnapshot(_))) {}

        a_tx.publish(typing_event(&alice, &bob), None).unwrap();
        assert!(matches!(b_rx.try_recv(), Ok(PushEvent::TypingStart(_))));
        assert!(a_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_to_offline_target_errors() {
        let hub = PushHub::new();
        let alice = UserId::from("alice");
        let ghost = UserId::from("ghost");

        let (a_tx, _a_rx) = hub.connect(&alice);
        let err = a_tx
            .publish(typing_event(&alice, &ghost), Some(&ghost))
            .unwrap_err();
        assert!(matches!(err, ChannelError::TargetUnknown(_)));
    }

    #[tokio::test]
    async fn test_disconnect_updates_online_set() {
        let hub = PushHub::new();
        let alice = UserId::from("alice");
        let bob = UserId::from("bob");

        let (a_tx, _a_rx) = hub.connect(&alice);
        let (_b_tx, mut b_rx) = hub.connect(&bob);
        while matches!(b_rx.try_recv(), Ok(PushEvent::PresenceSnapshot(_))) {}

        a_tx.disconnect();
        assert_eq!(hub.online(), vec![bob.clone()]);
        assert!(matches!(
            b_rx.try_recv().unwrap(),
            PushEvent::PresenceSnapshot(ref s) if s.online == vec![bob.clone()]
        ));
    }
}
