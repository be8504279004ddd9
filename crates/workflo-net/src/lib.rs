//! # workflo-net
//!
//! The push channel and the trackers fed by it: an in-process event hub with
//! the connect/publish/broadcast contract of the remote signaling server,
//! the presence tracker (full-snapshot replacement) and the auto-expiring
//! typing tracker.

pub mod hub;
pub mod presence;
pub mod typing;

pub use hub::{PushHub, PushSender};
pub use presence::PresenceTracker;
pub use typing::TypingTracker;
