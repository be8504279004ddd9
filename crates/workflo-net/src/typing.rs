//! Scoped typing indicators with automatic expiry.
//!
//! Stop events are best-effort and can be lost on abrupt disconnects, so
//! every entry also carries a deadline: reads never return an entry older
//! than the expiry window, whether or not a stop ever arrived.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use workflo_shared::constants::TYPING_EXPIRY_MS;
use workflo_shared::types::{TypingScope, UserId};

/// Participants currently typing, per scope.
#[derive(Debug)]
pub struct TypingTracker {
    expiry: Duration,
    scopes: HashMap<TypingScope, HashMap<UserId, Instant>>,
}

impl TypingTracker {
    pub fn new() -> Self {
        Self::with_expiry(Duration::from_millis(TYPING_EXPIRY_MS))
    }

    pub fn with_expiry(expiry: Duration) -> Self {
        Self {
            expiry,
            scopes: HashMap::new(),
        }
    }

    /// Record a typing-start. Repeated starts refresh the deadline instead of
    /// duplicating the entry.
    pub fn on_start(&mut self, scope: TypingScope, user: UserId) {
        debug!(user = %user, "Typing started");
        self.scopes
            .entry(scope)
            .or_default()
            .insert(user, Instant::now());
    }

    /// Record a typing-stop.
    pub fn on_stop(&mut self, scope: &TypingScope, user: &UserId) {
        if let Some(entries) = self.scopes.get_mut(scope) {
            if entries.remove(user).is_some() {
                debug!(user = %user, "Typing stopped");
            }
            if entries.is_empty() {
                self.scopes.remove(scope);
            }
        }
    }

    /// Participants typing in a scope right now. Prunes expired entries.
    pub fn typing_in(&mut self, scope: &TypingScope) -> Vec<UserId> {
        let now = Instant::now();
        let expiry = self.expiry;
        let Some(entries) = self.scopes.get_mut(scope) else {
            return Vec::new();
        };
        entries.retain(|_, started| now.duration_since(*started) <= expiry);
        if entries.is_empty() {
            self.scopes.remove(scope);
            return Vec::new();
        }
        let mut users: Vec<UserId> = entries.keys().cloned().collect();
        users.sort();
        users
    }

    pub fn is_typing(&mut self, scope: &TypingScope, user: &UserId) -> bool {
        self.typing_in(scope).contains(user)
    }
}

impl Default for TypingTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use workflo_shared::types::ConversationKey;

    fn scope() -> TypingScope {
        TypingScope::Conversation(ConversationKey::resolve(
            &UserId::from("alice"),
            &UserId::from("bob"),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_stop() {
        let mut tracker = TypingTracker::new();
        let bob = UserId::from("bob");

        tracker.on_start(scope(), bob.clone());
        assert!(tracker.is_typing(&scope(), &bob));

        tracker.on_stop(&scope(), &bob);
        assert!(!tracker.is_typing(&scope(), &bob));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_without_stop_event() {
        let mut tracker = TypingTracker::new();
        let bob = UserId::from("bob");

        tracker.on_start(scope(), bob.clone());
        tokio::time::advance(Duration::from_millis(TYPING_EXPIRY_MS + 1)).await;
        assert!(!tracker.is_typing(&scope(), &bob));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_start_refreshes_deadline() {
        let mut tracker = TypingTracker::new();
        let bob = UserId::from("bob");

        tracker.on_start(scope(), bob.clone());
        tokio::time::advance(Duration::from_millis(TYPING_EXPIRY_MS - 1_000)).await;
        tracker.on_start(scope(), bob.clone());
        tokio::time::advance(Duration::from_millis(2_000)).await;

        // Still within the refreshed window, and still a single entry.
        assert_eq!(tracker.typing_in(&scope()), vec![bob]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scopes_are_independent() {
        let mut tracker = TypingTracker::new();
        let bob = UserId::from("bob");
        let post = TypingScope::Post("post-1".into());

        tracker.on_start(post.clone(), bob.clone());
        assert!(tracker.is_typing(&post, &bob));
        assert!(!tracker.is_typing(&scope(), &bob));
    }
}
