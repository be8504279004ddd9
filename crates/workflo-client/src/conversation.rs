//! Message feed merger.
//!
//! Two independent producers feed one conversation: the log-store
//! subscription (full snapshots, authoritative, eventually consistent) and
//! the push channel (single messages, low latency, fire-and-forget). The
//! merger reconciles both into one ordered view keyed by message id.
//!
//! The two paths never share an id for the same logical message — the store
//! assigns ids on append, push events carry none — so a push entry is held
//! under a synthetic local id and matched against later snapshots by
//! `(sender, receiver, created_at, body)` equality. A push entry that no
//! snapshot confirms within the tolerance window is retained and surfaced as
//! unconfirmed, never silently dropped.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use workflo_shared::constants::PUSH_CONFIRM_TOLERANCE_MS;
use workflo_shared::types::{
    ConversationKey, DeliveryStatus, Message, MessageId, MessageRecord,
};
use workflo_store::StoredMessage;

struct Entry {
    message: Message,
    /// Monotonic arrival counter; breaks `created_at` ties.
    arrival: u64,
    /// Wall-clock receipt time (epoch millis), for the confirmation window.
    received_at: i64,
}

/// The merged, ordered, deduplicated view of one conversation.
pub struct ConversationFeed {
    key: ConversationKey,
    entries: HashMap<MessageId, Entry>,
    next_arrival: u64,
    tolerance_ms: i64,
    cache: Vec<Message>,
    dirty: bool,
}

impl ConversationFeed {
    pub fn new(key: ConversationKey) -> Self {
        Self::with_tolerance(key, PUSH_CONFIRM_TOLERANCE_MS)
    }

    pub fn with_tolerance(key: ConversationKey, tolerance_ms: i64) -> Self {
        Self {
            key,
            entries: HashMap::new(),
            next_arrival: 0,
            tolerance_ms,
            cache: Vec::new(),
            dirty: false,
        }
    }

    pub fn key(&self) -> &ConversationKey {
        &self.key
    }

    /// Merge a full feed snapshot. The feed is authoritative for persisted
    /// state: store entries are upserted by id, store entries missing from
    /// the snapshot are dropped, and synthetic push entries confirmed by
    /// field equality are replaced by their persisted counterpart.
    pub fn apply_snapshot(&mut self, snapshot: &[StoredMessage], now_ms: i64) {
        let mut seen: HashSet<MessageId> = HashSet::with_capacity(snapshot.len());

        for stored in snapshot {
            let id = MessageId::Store(stored.id.clone());
            seen.insert(id.clone());
            match self.entries.get_mut(&id) {
                Some(entry) => {
                    // Keep the original arrival slot so re-delivered
                    // snapshots do not reshuffle equal timestamps.
                    entry.message = Message::from_feed(stored.id.clone(), stored.record.clone());
                }
                None => {
                    let arrival = self.bump_arrival();
                    self.entries.insert(
                        id,
                        Entry {
                            message: Message::from_feed(stored.id.clone(), stored.record.clone()),
                            arrival,
                            received_at: now_ms,
                        },
                    );
                }
            }
        }

        self.entries.retain(|id, entry| match id {
            MessageId::Store(_) => seen.contains(id),
            MessageId::Local(_) => {
                let confirmed = snapshot
                    .iter()
                    .any(|s| s.record.same_logical_message(&entry.message.record));
                if confirmed {
                    debug!(conversation = %entry.message.record.conversation_key(),
                           "Push entry confirmed by feed");
                    return false;
                }
                if now_ms - entry.received_at > self.tolerance_ms {
                    entry.message.status = DeliveryStatus::Unconfirmed;
                }
                true
            }
        });

        self.dirty = true;
    }

    /// Append a push-delivered record immediately for low-latency display.
    /// Skipped when an existing entry already holds the same logical message,
    /// so the merge result is independent of which source arrived first.
    pub fn apply_push(&mut self, record: MessageRecord, now_ms: i64) {
        let duplicate = self
            .entries
            .values()
            .any(|e| e.message.record.same_logical_message(&record));
        if duplicate {
            debug!(conversation = %self.key, "Push event already merged, skipped");
            return;
        }

        let message = Message::from_push(record);
        let arrival = self.bump_arrival();
        self.entries.insert(
            message.id.clone(),
            Entry {
                message,
                arrival,
                received_at: now_ms,
            },
        );
        self.dirty = true;
    }

    /// The merged sequence, ascending by `created_at`, ties broken by
    /// arrival order. Lazily recomputed.
    ///
    /// The confirmation window is also checked here, not only when snapshots
    /// arrive: a silent feed is precisely the case where a push entry must
    /// surface as unconfirmed, and a silent feed delivers no snapshot to
    /// trigger the check.
    pub fn messages(&mut self, now_ms: i64) -> &[Message] {
        for entry in self.entries.values_mut() {
            if matches!(entry.message.id, MessageId::Local(_))
                && entry.message.status == DeliveryStatus::Pending
                && now_ms - entry.received_at > self.tolerance_ms
            {
                entry.message.status = DeliveryStatus::Unconfirmed;
                self.dirty = true;
            }
        }
        if self.dirty {
            let mut ordered: Vec<(&u64, &Message)> = self
                .entries
                .values()
                .map(|e| (&e.arrival, &e.message))
                .collect();
            ordered.sort_by_key(|(arrival, m)| (m.record.created_at, **arrival));
            self.cache = ordered.into_iter().map(|(_, m)| m.clone()).collect();
            self.dirty = false;
        }
        &self.cache
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn bump_arrival(&mut self) -> u64 {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        arrival
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflo_shared::types::{MessageKind, MessageOrigin, UserId};

    fn key() -> ConversationKey {
        ConversationKey::resolve(&UserId::from("alice"), &UserId::from("bob"))
    }

    fn record(body: &str, at: i64) -> MessageRecord {
        MessageRecord {
            sender_id: UserId::from("alice"),
            receiver_id: UserId::from("bob"),
            body: body.into(),
            kind: MessageKind::Text,
            file_name: None,
            created_at: at,
        }
    }

    fn stored(id: &str, body: &str, at: i64) -> StoredMessage {
        StoredMessage {
            id: id.into(),
            record: record(body, at),
        }
    }

    #[test]
    fn test_push_then_feed_yields_single_entry() {
        let mut feed = ConversationFeed::new(key());
        feed.apply_push(record("hello", 100), 100);
        assert_eq!(feed.messages(100).len(), 1);
        assert_eq!(feed.messages(100)[0].origin, MessageOrigin::Push);

        feed.apply_snapshot(&[stored("-m1", "hello", 100)], 150);
        let messages = feed.messages(150);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::Store("-m1".into()));
        assert_eq!(messages[0].status, DeliveryStatus::Synced);
    }

    #[test]
    fn test_feed_then_push_yields_single_entry() {
        let mut feed = ConversationFeed::new(key());
        feed.apply_snapshot(&[stored("-m1", "hello", 100)], 120);
        feed.apply_push(record("hello", 100), 130);

        let messages = feed.messages(130);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id, MessageId::Store("-m1".into()));
    }

    #[test]
    fn test_repeated_snapshots_are_idempotent() {
        let mut feed = ConversationFeed::new(key());
        let snapshot = [stored("-m1", "one", 100), stored("-m2", "two", 200)];
        feed.apply_snapshot(&snapshot, 210);
        feed.apply_snapshot(&snapshot, 220);
        assert_eq!(feed.messages(220).len(), 2);
    }

    #[test]
    fn test_snapshot_is_authoritative_for_removals() {
        let mut feed = ConversationFeed::new(key());
        feed.apply_snapshot(&[stored("-m1", "one", 100), stored("-m2", "two", 200)], 210);
        feed.apply_snapshot(&[stored("-m2", "two", 200)], 220);

        let messages = feed.messages(220);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].record.body, "two");
    }

    #[test]
    fn test_unconfirmed_push_entry_is_retained_and_flagged() {
        let mut feed = ConversationFeed::with_tolerance(key(), 1_000);
        feed.apply_push(record("ghost", 100), 100);

        // A snapshot inside the window leaves it pending.
        feed.apply_snapshot(&[], 500);
        assert_eq!(feed.messages(500)[0].status, DeliveryStatus::Pending);

        // Past the tolerance it is flagged, never dropped.
        feed.apply_snapshot(&[], 2_000);
        let messages = feed.messages(2_000);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, DeliveryStatus::Unconfirmed);
    }

    #[test]
    fn test_push_entry_flagged_on_read_when_feed_stays_silent() {
        // No snapshot ever arrives; the read alone must surface the entry as
        // sent-but-not-synced once the window has passed.
        let mut feed = ConversationFeed::with_tolerance(key(), 1_000);
        feed.apply_push(record("ghost", 100), 100);

        assert_eq!(feed.messages(600)[0].status, DeliveryStatus::Pending);

        let messages = feed.messages(1_200);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].status, DeliveryStatus::Unconfirmed);
    }

    #[test]
    fn test_duplicate_push_is_skipped() {
        let mut feed = ConversationFeed::new(key());
        feed.apply_push(record("hi", 100), 100);
        feed.apply_push(record("hi", 100), 110);
        assert_eq!(feed.messages(110).len(), 1);
    }

    #[test]
    fn test_order_ascending_with_arrival_tiebreak() {
        let mut feed = ConversationFeed::new(key());
        feed.apply_push(record("late", 300), 300);
        feed.apply_snapshot(
            &[
                stored("-m1", "early", 100),
                stored("-m2", "tie-first", 200),
                stored("-m3", "tie-second", 200),
            ],
            310,
        );

        let bodies: Vec<&str> = feed
            .messages(310)
            .iter()
            .map(|m| m.record.body.as_str())
            .collect();
        assert_eq!(bodies, vec!["early", "tie-first", "tie-second", "late"]);
    }

    #[test]
    fn test_distinct_messages_with_equal_fields_stay_distinct_in_feed() {
        // Two genuinely different persisted messages that happen to share
        // sender/receiver/timestamp/body keep their own ids.
        let mut feed = ConversationFeed::new(key());
        feed.apply_snapshot(&[stored("-m1", "ok", 100), stored("-m2", "ok", 100)], 110);
        assert_eq!(feed.messages(110).len(), 2);
    }
}
