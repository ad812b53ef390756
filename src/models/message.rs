// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat message model and the ordered feed view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::AppError;

/// Maximum message length in characters (after trimming).
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// A chat message as delivered by the backend.
///
/// Messages are immutable once created; `created_at` comes from the
/// backend server clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Backend-assigned document id
    pub id: String,
    /// Author's user id
    pub author_uid: String,
    /// Message body
    pub text: String,
    /// Server-assigned creation time
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Feed ordering key: creation time, ties broken by id.
    pub fn feed_key(&self) -> FeedKey {
        (self.created_at, self.id.clone())
    }
}

pub type FeedKey = (DateTime<Utc>, String);

/// Validate message text, returning the trimmed body to store.
pub fn validate_message_text(text: &str) -> Result<&str, AppError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation("Message text is empty".to_string()));
    }

    let chars = trimmed.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "Message text is {} characters, limit is {}",
            chars, MAX_MESSAGE_CHARS
        )));
    }

    Ok(trimmed)
}

/// Slice to the most recent `window` messages of an ascending snapshot.
pub fn latest_window(messages: &[Message], window: usize) -> &[Message] {
    let start = messages.len().saturating_sub(window);
    &messages[start..]
}

/// Materialized, always-sorted view of the message collection.
///
/// Backend change events arrive in network order; the view keeps
/// messages ordered by `(created_at, id)` no matter how they arrive.
#[derive(Debug, Default, Clone)]
pub struct FeedView {
    ordered: BTreeMap<FeedKey, Message>,
    keys_by_id: HashMap<String, FeedKey>,
}

impl FeedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a message.
    pub fn upsert(&mut self, message: Message) {
        let key = message.feed_key();
        if let Some(old_key) = self.keys_by_id.insert(message.id.clone(), key.clone()) {
            self.ordered.remove(&old_key);
        }
        self.ordered.insert(key, message);
    }

    /// Remove a message by id. Returns `true` if it was present.
    pub fn remove(&mut self, id: &str) -> bool {
        match self.keys_by_id.remove(id) {
            Some(key) => self.ordered.remove(&key).is_some(),
            None => false,
        }
    }

    /// Full ordered snapshot, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.ordered.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }
}
