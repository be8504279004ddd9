//! Durable ordered log store: append assigns the canonical message id, and
//! subscribers receive the *entire* current message set of a conversation on
//! subscribe and after every append (full snapshots, not diffs).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use workflo_shared::constants::MAX_MESSAGE_SIZE;
use workflo_shared::types::{ConversationKey, MessageRecord};

use crate::error::{Result, StoreError};

/// A persisted message together with its store-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub record: MessageRecord,
}

/// Full replacement dump of a conversation's persisted messages.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub conversation: ConversationKey,
    pub messages: Vec<StoredMessage>,
}

/// Guard for a feed subscription. Dropping it detaches the listener
/// immediately; no snapshot is delivered afterwards.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

#[async_trait]
pub trait LogStore: Send + Sync {
    /// Append a record to a conversation's log. Returns the assigned id.
    async fn append(&self, key: &ConversationKey, record: MessageRecord) -> Result<String>;

    /// Subscribe to full snapshots of a conversation. The current snapshot
    /// is delivered immediately, then again after every append.
    fn subscribe(&self, key: &ConversationKey, tx: mpsc::Sender<FeedSnapshot>) -> Subscription;
}

struct ConversationLog {
    next_seq: u64,
    entries: Vec<StoredMessage>,
}

struct Inner {
    logs: HashMap<ConversationKey, ConversationLog>,
    subscribers: HashMap<u64, (ConversationKey, mpsc::Sender<FeedSnapshot>)>,
    next_sub_id: u64,
}

/// In-memory log store with the same observable contract as the remote one.
#[derive(Clone)]
pub struct MemoryLogStore {
    inner: Arc<Mutex<Inner>>,
    fail_next_append: Arc<AtomicBool>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                logs: HashMap::new(),
                subscribers: HashMap::new(),
                next_sub_id: 0,
            })),
            fail_next_append: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make the next `append` fail with [`StoreError::Unavailable`].
    /// Used by tests to exercise the delivery-error path.
    pub fn fail_next_append(&self) {
        self.fail_next_append.store(true, Ordering::SeqCst);
    }

    fn snapshot_locked(inner: &Inner, key: &ConversationKey) -> FeedSnapshot {
        FeedSnapshot {
            conversation: key.clone(),
            messages: inner
                .logs
                .get(key)
                .map(|log| log.entries.clone())
                .unwrap_or_default(),
        }
    }

    fn notify_locked(inner: &Inner, key: &ConversationKey) {
        let snapshot = Self::snapshot_locked(inner, key);
        for (conversation, tx) in inner.subscribers.values() {
            if conversation != key {
                continue;
            }
            // Fire-and-forget: a full queue just waits for the next append,
            // which carries the complete state anyway.
            if let Err(e) = tx.try_send(snapshot.clone()) {
                debug!(conversation = %key, error = %e, "Snapshot delivery skipped");
            }
        }
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn append(&self, key: &ConversationKey, record: MessageRecord) -> Result<String> {
        if record.body.len() > MAX_MESSAGE_SIZE {
            return Err(StoreError::TooLarge {
                size: record.body.len(),
                limit: MAX_MESSAGE_SIZE,
            });
        }
        if self.fail_next_append.swap(false, Ordering::SeqCst) {
            warn!(conversation = %key, "Simulated append failure");
            return Err(StoreError::Unavailable("append rejected".into()));
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let log = inner.logs.entry(key.clone()).or_insert(ConversationLog {
            next_seq: 0,
            entries: Vec::new(),
        });

        let id = format!("-m{:08x}", log.next_seq);
        log.next_seq += 1;
        log.entries.push(StoredMessage {
            id: id.clone(),
            record,
        });

        debug!(conversation = %key, id = %id, "Appended message");
        Self::notify_locked(&inner, key);
        Ok(id)
    }

    fn subscribe(&self, key: &ConversationKey, tx: mpsc::Sender<FeedSnapshot>) -> Subscription {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let sub_id = inner.next_sub_id;
        inner.next_sub_id += 1;

        // Deliver the current state right away, like a fresh listener would
        // receive from the remote store.
        let snapshot = Self::snapshot_locked(&inner, key);
        if let Err(e) = tx.try_send(snapshot) {
            debug!(conversation = %key, error = %e, "Initial snapshot delivery skipped");
        }

        inner.subscribers.insert(sub_id, (key.clone(), tx));
        debug!(conversation = %key, sub = sub_id, "Feed subscription added");

        let store = self.inner.clone();
        let key = key.clone();
        Subscription::new(move || {
            let mut inner = store.lock().unwrap_or_else(|e| e.into_inner());
            inner.subscribers.remove(&sub_id);
            debug!(conversation = %key, sub = sub_id, "Feed subscription removed");
        })
    }
}
