// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Message submission.

use crate::db::ChatDb;
use crate::error::Result;
use crate::models::message::validate_message_text;
use crate::models::Message;

/// Posts messages to the shared room.
#[derive(Clone)]
pub struct MessageService {
    db: ChatDb,
}

impl MessageService {
    pub fn new(db: ChatDb) -> Self {
        Self { db }
    }

    /// Validate and append a message.
    ///
    /// The stored text is trimmed. The message shows up through the feed
    /// once the backend commits it; nothing is inserted locally.
    pub async fn post(&self, author_uid: &str, text: &str) -> Result<Message> {
        let text = validate_message_text(text)?;
        let message = self.db.insert_message(author_uid, text).await?;

        tracing::info!(
            uid = %author_uid,
            message_id = %message.id,
            chars = text.chars().count(),
            "Message posted"
        );

        Ok(message)
    }
}
