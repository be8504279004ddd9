//! The per-participant coordinator.
//!
//! One [`ChatClient`] owns every piece of realtime state for a signed-in
//! participant: open conversation feeds, presence, typing indicators and the
//! call controller. All mutation happens on the owner's task; inbound push
//! events and feed snapshots queue up and are drained either deterministically
//! with [`ChatClient::pump`] or continuously with [`ChatClient::run`].

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use workflo_media::devices::MediaConstraints;
use workflo_media::CallState;
use workflo_net::{PresenceTracker, PushHub, PushSender, TypingTracker};
use workflo_shared::constants::{CLIENT_EVENT_CAPACITY, SNAPSHOT_QUEUE_CAPACITY};
use workflo_shared::protocol::{PushEvent, TypingEvent};
use workflo_shared::types::{ConversationKey, Message, TypingScope, UserId};
use workflo_store::{FeedSnapshot, Subscription};

use crate::calls::{CallController, CallError};
use crate::context::ChatContext;
use crate::conversation::ConversationFeed;
use crate::events::{emit, ClientEvent};

struct OpenConversation {
    feed: ConversationFeed,
    /// Cancels the log-store subscription on drop.
    _subscription: Subscription,
}

pub struct ChatClient {
    pub(crate) ctx: ChatContext,
    pub(crate) push: PushSender,
    push_rx: mpsc::Receiver<PushEvent>,
    snapshot_tx: mpsc::Sender<FeedSnapshot>,
    snapshot_rx: mpsc::Receiver<FeedSnapshot>,
    conversations: HashMap<ConversationKey, OpenConversation>,
    presence: PresenceTracker,
    typing: TypingTracker,
    /// Scopes this client is currently typing in, to turn keystrokes into
    /// start/stop edges.
    typing_active: HashSet<TypingScope>,
    calls: CallController,
    pub(crate) events_tx: mpsc::Sender<ClientEvent>,
}

impl ChatClient {
    /// Join the push hub and return the client plus the UI event stream.
    pub fn connect(ctx: ChatContext, hub: &PushHub) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (push, push_rx) = hub.connect(&ctx.local_user);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(SNAPSHOT_QUEUE_CAPACITY);
        let (events_tx, events_rx) = mpsc::channel(CLIENT_EVENT_CAPACITY);

        let calls = CallController::new(
            ctx.local_user.clone(),
            push.clone(),
            ctx.devices.clone(),
            ctx.transports.clone(),
            ctx.ice.clone(),
            events_tx.clone(),
        );

        info!(user = %ctx.local_user, "Client connected");
        let client = Self {
            ctx,
            push,
            push_rx,
            snapshot_tx,
            snapshot_rx,
            conversations: HashMap::new(),
            presence: PresenceTracker::new(),
            typing: TypingTracker::new(),
            typing_active: HashSet::new(),
            calls,
            events_tx,
        };
        (client, events_rx)
    }

    pub fn local_user(&self) -> &UserId {
        &self.ctx.local_user
    }

    /// Open (or return) the conversation with another participant and start
    /// its feed subscription. The key is canonical, so both sides resolve the
    /// same conversation regardless of who opens it.
    pub fn open_conversation(&mut self, other: &UserId) -> ConversationKey {
        let key = ConversationKey::resolve(&self.ctx.local_user, other);
        if !self.conversations.contains_key(&key) {
            let subscription = self.ctx.log.subscribe(&key, self.snapshot_tx.clone());
            info!(conversation = %key, "Conversation opened");
            self.conversations.insert(
                key.clone(),
                OpenConversation {
                    feed: ConversationFeed::new(key.clone()),
                    _subscription: subscription,
                },
            );
        }
        key
    }

    /// Drop the feed and cancel its subscription. Snapshots already queued
    /// for this conversation are discarded when drained.
    pub fn close_conversation(&mut self, key: &ConversationKey) {
        if self.conversations.remove(key).is_some() {
            debug!(conversation = %key, "Conversation closed");
        }
    }

    /// The merged ordered view of an open conversation. Empty for a closed
    /// one.
    pub fn messages(&mut self, key: &ConversationKey) -> &[Message] {
        match self.conversations.get_mut(key) {
            Some(open) => open.feed.messages(now_ms()),
            None => &[],
        }
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.presence.is_online(user)
    }

    pub fn online_users(&self) -> Vec<UserId> {
        self.presence.online_users()
    }

    /// Who is typing in a scope right now (expired entries pruned).
    pub fn typing_users(&mut self, scope: &TypingScope) -> Vec<UserId> {
        self.typing.typing_in(scope)
    }

    /// Report the local input state for a scope. Non-empty input publishes a
    /// start on every call so remote deadlines keep refreshing; emptied input
    /// publishes a single stop.
    pub fn set_typing(&mut self, scope: TypingScope, input: &str) {
        let event = TypingEvent {
            scope: scope.clone(),
            user_id: self.ctx.local_user.clone(),
        };
        if input.trim().is_empty() {
            if self.typing_active.remove(&scope) {
                if let Err(e) = self.push.publish(PushEvent::TypingStop(event), None) {
                    debug!(error = %e, "Typing stop dropped");
                }
            }
        } else {
            self.typing_active.insert(scope);
            if let Err(e) = self.push.publish(PushEvent::TypingStart(event), None) {
                debug!(error = %e, "Typing start dropped");
            }
        }
    }

    pub fn call_state(&self) -> CallState {
        self.calls.state()
    }

    pub fn call_remote(&self) -> Option<&UserId> {
        self.calls.remote()
    }

    pub async fn start_call(
        &mut self,
        remote: &UserId,
        constraints: MediaConstraints,
    ) -> Result<Uuid, CallError> {
        self.calls.initiate(remote, constraints, &self.presence).await
    }

    pub async fn accept_call(&mut self, constraints: MediaConstraints) -> Result<(), CallError> {
        self.calls.accept(constraints).await
    }

    pub async fn decline_call(&mut self) {
        self.calls.decline().await;
    }

    pub async fn hang_up(&mut self) {
        self.calls.hang_up().await;
    }

    /// Drain everything currently queued on both inbound channels. Returns
    /// once both are momentarily empty; tests interleave this with actions to
    /// get deterministic delivery.
    pub async fn pump(&mut self) {
        loop {
            if let Ok(event) = self.push_rx.try_recv() {
                self.handle_push(event).await;
                continue;
            }
            if let Ok(snapshot) = self.snapshot_rx.try_recv() {
                self.apply_snapshot(snapshot);
                continue;
            }
            break;
        }
    }

    /// Event loop for a live client; runs until the push channel closes.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.push_rx.recv() => match event {
                    Some(event) => self.handle_push(event).await,
                    None => break,
                },
                snapshot = self.snapshot_rx.recv() => {
                    if let Some(snapshot) = snapshot {
                        self.apply_snapshot(snapshot);
                    }
                }
            }
        }
        info!(user = %self.ctx.local_user, "Push channel closed, client loop ended");
    }

    /// Leave the hub. An in-flight call is hung up first so the peer is not
    /// left ringing.
    pub async fn disconnect(&mut self) {
        self.calls.hang_up().await;
        self.push.disconnect();
        self.conversations.clear();
        info!(user = %self.ctx.local_user, "Client disconnected");
    }

    async fn handle_push(&mut self, event: PushEvent) {
        match event {
            PushEvent::NewMessage(record) => {
                // Own appends come back through the feed subscription; the
                // push echo would only race it.
                if record.sender_id == self.ctx.local_user {
                    return;
                }
                let key = record.conversation_key();
                match self.conversations.get_mut(&key) {
                    Some(open) => {
                        open.feed.apply_push(record, now_ms());
                        emit(
                            &self.events_tx,
                            ClientEvent::ConversationUpdated { conversation: key },
                        );
                    }
                    None => {
                        debug!(conversation = %key, "Push message for closed conversation dropped");
                    }
                }
            }
            PushEvent::TypingStart(typing) => {
                if typing.user_id != self.ctx.local_user {
                    let scope = typing.scope.clone();
                    self.typing.on_start(typing.scope, typing.user_id);
                    let users = self.typing.typing_in(&scope);
                    emit(&self.events_tx, ClientEvent::TypingChanged { scope, users });
                }
            }
            PushEvent::TypingStop(typing) => {
                if typing.user_id != self.ctx.local_user {
                    self.typing.on_stop(&typing.scope, &typing.user_id);
                    let users = self.typing.typing_in(&typing.scope);
                    emit(
                        &self.events_tx,
                        ClientEvent::TypingChanged {
                            scope: typing.scope,
                            users,
                        },
                    );
                }
            }
            PushEvent::PresenceSnapshot(snapshot) => {
                self.presence.apply_snapshot(&snapshot);
                emit(
                    &self.events_tx,
                    ClientEvent::PresenceChanged {
                        online: snapshot.online,
                    },
                );
            }
            PushEvent::CallOffer(signal) => self.calls.handle_offer(signal),
            PushEvent::CallAnswer(signal) => self.calls.handle_answer(signal).await,
            PushEvent::IceCandidate(candidate) => self.calls.handle_candidate(candidate).await,
            PushEvent::CallEnd(term) => self.calls.handle_remote_end(term).await,
            PushEvent::CallReject(term) => self.calls.handle_remote_reject(term).await,
        }
    }

    fn apply_snapshot(&mut self, snapshot: FeedSnapshot) {
        let Some(open) = self.conversations.get_mut(&snapshot.conversation) else {
            // Subscription cancelled after the snapshot was queued.
            debug!(conversation = %snapshot.conversation, "Late snapshot for closed conversation dropped");
            return;
        };
        open.feed.apply_snapshot(&snapshot.messages, now_ms());
        emit(
            &self.events_tx,
            ClientEvent::ConversationUpdated {
                conversation: snapshot.conversation,
            },
        );
    }
}

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
