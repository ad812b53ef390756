// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! New-message notification hints.

use crate::models::message::FeedKey;
use crate::models::Message;

/// Tracks the newest message a session has seen and picks out arrivals.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    last_seen: Option<FeedKey>,
    primed: bool,
}

impl NotificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot and return the ids worth notifying about.
    ///
    /// The first snapshot only establishes the baseline. After that, any
    /// message newer than the previous newest one and written by someone
    /// other than `own_uid` is reported, provided `enabled` is set.
    pub fn observe(&mut self, snapshot: &[Message], own_uid: &str, enabled: bool) -> Vec<String> {
        let newest = snapshot.iter().map(Message::feed_key).max();

        let hints = if self.primed && enabled {
            snapshot
                .iter()
                .filter(|m| m.author_uid != own_uid)
                .filter(|m| self.last_seen.as_ref().is_none_or(|seen| m.feed_key() > *seen))
                .map(|m| m.id.clone())
                .collect()
        } else {
            Vec::new()
        };

        // Deletions can shrink the snapshot; never move the mark backwards
        if newest > self.last_seen {
            self.last_seen = newest;
        }
        self.primed = true;

        hints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(id: &str, author: &str, secs: i64) -> Message {
        Message {
            id: id.to_string(),
            author_uid: author.to_string(),
            text: id.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_first_snapshot_is_baseline() {
        let mut tracker = NotificationTracker::new();
        let hints = tracker.observe(&[msg("a", "other", 1)], "me", true);
        assert!(hints.is_empty());
    }

    #[test]
    fn test_reports_new_messages_from_others() {
        let mut tracker = NotificationTracker::new();
        tracker.observe(&[msg("a", "other", 1)], "me", true);

        let snapshot = [
            msg("a", "other", 1),
            msg("b", "me", 2),
            msg("c", "other", 3),
        ];
        assert_eq!(tracker.observe(&snapshot, "me", true), vec!["c"]);

        // Same snapshot again: nothing new
        assert!(tracker.observe(&snapshot, "me", true).is_empty());
    }

    #[test]
    fn test_disabled_reports_nothing_but_advances() {
        let mut tracker = NotificationTracker::new();
        tracker.observe(&[], "me", false);
        assert!(tracker
            .observe(&[msg("a", "other", 1)], "me", false)
            .is_empty());

        // Enabling later does not replay what was already seen
        assert!(tracker
            .observe(&[msg("a", "other", 1)], "me", true)
            .is_empty());
    }

    #[test]
    fn test_deletion_does_not_rewind() {
        let mut tracker = NotificationTracker::new();
        tracker.observe(&[msg("a", "x", 1), msg("b", "x", 2)], "me", true);
        tracker.observe(&[msg("a", "x", 1)], "me", true);

        assert!(tracker.observe(&[msg("a", "x", 1)], "me", true).is_empty());
        assert_eq!(
            tracker.observe(&[msg("a", "x", 1), msg("c", "x", 3)], "me", true),
            vec!["c"]
        );
    }
}
