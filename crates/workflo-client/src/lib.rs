//! # workflo-client
//!
//! The realtime coordinator. One [`ChatClient`] per participant owns:
//!
//! - the per-conversation feed merger reconciling full log-store snapshots
//!   with low-latency push events into one ordered, deduplicated view;
//! - the presence and typing trackers fed by the push channel;
//! - the call controller driving the signaling state machine, the media
//!   devices and the peer transport.
//!
//! All handlers run on the caller's task, serialized: UI intents are method
//! calls, inbound push events and feed snapshots are drained by
//! [`ChatClient::pump`] (deterministic, used by tests) or the
//! [`ChatClient::run`] select loop.

pub mod calls;
pub mod client;
pub mod context;
pub mod conversation;
pub mod events;
pub mod messaging;

pub use calls::{CallController, CallError};
pub use client::ChatClient;
pub use context::ChatContext;
pub use conversation::ConversationFeed;
pub use events::ClientEvent;
pub use messaging::DeliveryError;
