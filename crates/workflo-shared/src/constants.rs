/// Application name
pub const APP_NAME: &str = "Workflo";

/// How long a typing indicator survives without a refresh, in milliseconds.
///
/// Stop events are best-effort; receivers expire entries on their own so a
/// lost `typingStop` or an abrupt disconnect never leaves a ghost indicator.
pub const TYPING_EXPIRY_MS: u64 = 5_000;

/// How long a push-delivered message may wait for feed confirmation before
/// it is surfaced as "sent but not synced", in milliseconds.
pub const PUSH_CONFIRM_TOLERANCE_MS: i64 = 10_000;

/// Capacity of each client's push-event queue. The channel is fire-and-forget;
/// a full queue drops the event rather than blocking the hub.
pub const PUSH_QUEUE_CAPACITY: usize = 256;

/// Capacity of the feed-snapshot queue shared by a client's subscriptions.
pub const SNAPSHOT_QUEUE_CAPACITY: usize = 64;

/// Capacity of the UI notification queue.
pub const CLIENT_EVENT_CAPACITY: usize = 256;

/// Default STUN server used for peer transport reflection.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Maximum message body size in bytes (256 KiB)
pub const MAX_MESSAGE_SIZE: usize = 262_144;

/// Maximum attachment size in bytes (50 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 50 * 1024 * 1024;
