//! Peer presence tracking.
//!
//! The channel delivers *full* online-set broadcasts; each one replaces the
//! previous state wholesale. Individual join/leave deltas are never trusted
//! because the channel does not guarantee their delivery across reconnects.

use std::collections::HashSet;

use tracing::debug;

use workflo_shared::protocol::PresenceSnapshot;
use workflo_shared::types::UserId;

/// Latest known set of connected participants.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    online: HashSet<UserId>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire set from a broadcast snapshot.
    pub fn apply_snapshot(&mut self, snapshot: &PresenceSnapshot) {
        self.online = snapshot.online.iter().cloned().collect();
        debug!(count = self.online.len(), "Presence snapshot applied");
    }

    pub fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }

    pub fn online_count(&self) -> usize {
        self.online.len()
    }

    pub fn online_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.online.iter().cloned().collect();
        users.sort();
        users
    }
}
