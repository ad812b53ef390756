// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer.
//!
//! `ChatDb` fronts either Firestore or the in-memory store; callers never
//! see which one is behind it.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use self::memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Message, ProfileDoc, ProfileUpdate};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Collection names as constants.
pub mod collections {
    pub const MESSAGES: &str = "messages";
    /// Profiles, keyed by user id
    pub const USERS: &str = "users";
}

/// Event produced by a live message listener.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    /// Full ordered contents of the collection, oldest first
    Snapshot(Vec<Message>),
    /// The listen target failed (permission denied, stream closed, ...)
    Error(String),
}

/// A running listen on the message collection.
pub struct FeedListener {
    pub events: mpsc::UnboundedReceiver<FeedEvent>,
    handle: ListenHandle,
}

enum ListenHandle {
    Firestore(Box<self::firestore::MessageListener>),
    Local,
}

impl FeedListener {
    pub(crate) fn local(events: mpsc::UnboundedReceiver<FeedEvent>) -> Self {
        Self {
            events,
            handle: ListenHandle::Local,
        }
    }

    pub(crate) fn firestore(
        events: mpsc::UnboundedReceiver<FeedEvent>,
        listener: self::firestore::MessageListener,
    ) -> Self {
        Self {
            events,
            handle: ListenHandle::Firestore(Box::new(listener)),
        }
    }

    /// Stop the underlying listen stream.
    pub async fn shutdown(self) {
        match self.handle {
            ListenHandle::Firestore(listener) => {
                let mut listener = *listener;
                if let Err(e) = listener.shutdown().await {
                    tracing::warn!(error = %e, "Failed to shut down Firestore listener");
                }
            }
            ListenHandle::Local => {}
        }
    }
}

#[derive(Clone)]
enum Backend {
    Firestore(FirestoreDb),
    Memory(Arc<MemoryStore>),
}

/// Document database used by the chat components.
#[derive(Clone)]
pub struct ChatDb {
    backend: Backend,
}

impl ChatDb {
    pub fn firestore(db: FirestoreDb) -> Self {
        Self {
            backend: Backend::Firestore(db),
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            backend: Backend::Memory(store),
        }
    }

    /// Offline database: every operation fails with a backend error.
    pub fn new_mock() -> Self {
        Self::firestore(FirestoreDb::new_mock())
    }

    /// Append a message; the backend assigns id and creation time.
    pub async fn insert_message(&self, author_uid: &str, text: &str) -> Result<Message, AppError> {
        match &self.backend {
            Backend::Firestore(db) => db.insert_message(author_uid, text).await,
            Backend::Memory(store) => store.insert_message(author_uid, text),
        }
    }

    /// Point read of a profile document.
    pub async fn get_profile(&self, uid: &str) -> Result<Option<ProfileDoc>, AppError> {
        match &self.backend {
            Backend::Firestore(db) => db.get_profile(uid).await,
            Backend::Memory(store) => store.get_profile(uid),
        }
    }

    /// Merge-write one profile field, creating the document if needed.
    pub async fn merge_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), AppError> {
        match &self.backend {
            Backend::Firestore(db) => db.merge_profile(uid, update).await,
            Backend::Memory(store) => store.merge_profile(uid, update),
        }
    }

    /// Start a live listen on the message collection.
    pub async fn listen_messages(&self) -> Result<FeedListener, AppError> {
        match &self.backend {
            Backend::Firestore(db) => db.listen_messages().await,
            Backend::Memory(store) => Ok(store.listen_messages()),
        }
    }
}
