use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Participant identity = opaque stable id assigned by the user directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical key for the conversation between two participants.
///
/// Derived from the unordered pair of ids under their lexicographic order, so
/// `resolve(a, b) == resolve(b, a)`. The key is never recomputed once a
/// conversation exists; participant display names may change freely.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ConversationKey(String);

impl ConversationKey {
    pub fn resolve(a: &UserId, b: &UserId) -> Self {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("chat_{}_{}", lo.0, hi.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a message in the merged view.
///
/// The canonical id is assigned by the log store on append. A message that
/// has so far only arrived on the push channel carries a synthetic local id
/// until a feed snapshot confirms it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Store-assigned id (authoritative).
    Store(String),
    /// Synthetic id for a push-only message awaiting feed confirmation.
    Local(Uuid),
}

impl MessageId {
    pub fn local() -> Self {
        Self::Local(Uuid::new_v4())
    }

    pub fn is_store(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(id) => write!(f, "{id}"),
            Self::Local(id) => write!(f, "local-{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

/// Which source a merged entry arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageOrigin {
    Feed,
    Push,
}

/// Client-visible delivery status of a merged entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    /// Present in the persisted feed.
    Synced,
    /// Push-delivered, awaiting feed confirmation.
    Pending,
    /// Push-delivered and unconfirmed past the tolerance window.
    /// Retained and shown as sent-but-not-synced, never silently dropped.
    Unconfirmed,
}

/// The persisted shape of a message, as appended to the log store and as
/// carried by `newMessage` push events. Carries no id: the store assigns one
/// on append.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    /// Message text, or the blob URL for image/file messages.
    pub body: String,
    pub kind: MessageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Creation time in epoch milliseconds.
    pub created_at: i64,
}

impl MessageRecord {
    /// Equality rule used to reconcile a push-only entry against a feed
    /// snapshot: the two paths never share an id for the same logical
    /// message, so matching falls back to field equality.
    pub fn same_logical_message(&self, other: &MessageRecord) -> bool {
        self.sender_id == other.sender_id
            && self.receiver_id == other.receiver_id
            && self.created_at == other.created_at
            && self.body == other.body
    }

    pub fn conversation_key(&self) -> ConversationKey {
        ConversationKey::resolve(&self.sender_id, &self.receiver_id)
    }
}

/// One entry of the merged conversation view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(flatten)]
    pub record: MessageRecord,
    pub origin: MessageOrigin,
    pub status: DeliveryStatus,
}

impl Message {
    pub fn from_feed(id: String, record: MessageRecord) -> Self {
        Self {
            id: MessageId::Store(id),
            record,
            origin: MessageOrigin::Feed,
            status: DeliveryStatus::Synced,
        }
    }

    pub fn from_push(record: MessageRecord) -> Self {
        Self {
            id: MessageId::local(),
            record,
            origin: MessageOrigin::Push,
            status: DeliveryStatus::Pending,
        }
    }
}

/// Scope of a typing indicator: a one-to-one conversation or a post's
/// comment thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum TypingScope {
    Conversation(ConversationKey),
    Post(String),
}
