// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Process-local document store with live snapshots.
//!
//! Used for local development (`CHAT_BACKEND=memory`) and tests. Mirrors
//! the Firestore semantics the chat relies on: server-assigned ids and
//! strictly increasing creation times, merge writes on profiles, and a
//! full snapshot to every listener on each change. Read counters and
//! failure switches let tests observe and disturb backend traffic.

use crate::db::{FeedEvent, FeedListener};
use crate::error::AppError;
use crate::models::{FeedView, Message, ProfileDoc, ProfileUpdate};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct Inner {
    feed: FeedView,
    profiles: HashMap<String, ProfileDoc>,
    listeners: Vec<mpsc::UnboundedSender<FeedEvent>>,
    next_id: u64,
    last_created: Option<DateTime<Utc>>,
}

impl Inner {
    /// Server clock: wall time, bumped to stay strictly increasing.
    fn server_time(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let at = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(at);
        at
    }

    fn broadcast(&mut self, event: FeedEvent) {
        self.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// In-memory message and profile store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    profile_reads: AtomicUsize,
    profile_writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_write(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Backend("write rejected (simulated)".to_string()));
        }
        Ok(())
    }

    // ─── Messages ────────────────────────────────────────────────

    pub fn insert_message(&self, author_uid: &str, text: &str) -> Result<Message, AppError> {
        self.check_write()?;

        let mut inner = self.lock();
        inner.next_id += 1;
        let message = Message {
            id: format!("msg-{:08}", inner.next_id),
            author_uid: author_uid.to_string(),
            text: text.to_string(),
            created_at: inner.server_time(),
        };
        inner.feed.upsert(message.clone());

        let snapshot = inner.feed.snapshot();
        inner.broadcast(FeedEvent::Snapshot(snapshot));

        Ok(message)
    }

    /// Out-of-band removal (administrative delete).
    pub fn delete_message(&self, id: &str) -> bool {
        let mut inner = self.lock();
        if !inner.feed.remove(id) {
            return false;
        }
        let snapshot = inner.feed.snapshot();
        inner.broadcast(FeedEvent::Snapshot(snapshot));
        true
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().feed.snapshot()
    }

    /// Register a listener; it immediately receives the current snapshot.
    pub fn listen_messages(&self) -> FeedListener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Receiver is still in hand, so this cannot fail
        let _ = tx.send(FeedEvent::Snapshot(inner.feed.snapshot()));
        inner.listeners.push(tx);
        FeedListener::local(rx)
    }

    /// Fail every active listen target with the given reason.
    pub fn fail_listeners(&self, reason: &str) {
        self.lock().broadcast(FeedEvent::Error(reason.to_string()));
    }

    /// Number of listeners whose receiver is still alive.
    pub fn active_listeners(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|tx| !tx.is_closed());
        inner.listeners.len()
    }

    // ─── Profiles ────────────────────────────────────────────────

    pub fn get_profile(&self, uid: &str) -> Result<Option<ProfileDoc>, AppError> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Backend("read failed (simulated)".to_string()));
        }
        Ok(self.lock().profiles.get(uid).cloned())
    }

    pub fn merge_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), AppError> {
        self.check_write()?;
        self.profile_writes.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .profiles
            .entry(uid.to_string())
            .or_default()
            .merge(update);
        Ok(())
    }

    /// Seed a profile document directly, bypassing counters.
    pub fn put_profile(&self, uid: &str, doc: ProfileDoc) {
        self.lock().profiles.insert(uid.to_string(), doc);
    }

    // ─── Test Hooks ──────────────────────────────────────────────

    pub fn profile_reads(&self) -> usize {
        self.profile_reads.load(Ordering::SeqCst)
    }

    pub fn profile_writes(&self) -> usize {
        self.profile_writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_assigns_increasing_times_and_unique_ids() {
        let store = MemoryStore::new();
        let a = store.insert_message("u1", "a").unwrap();
        let b = store.insert_message("u1", "b").unwrap();
        let c = store.insert_message("u2", "c").unwrap();

        assert!(a.created_at < b.created_at && b.created_at < c.created_at);
        assert_ne!(a.id, b.id);

        let texts: Vec<String> = store.messages().into_iter().map(|m| m.text).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_listener_gets_initial_and_change_snapshots() {
        let store = MemoryStore::new();
        store.insert_message("u1", "first").unwrap();

        let mut listener = store.listen_messages();
        match listener.events.recv().await {
            Some(FeedEvent::Snapshot(s)) => assert_eq!(s.len(), 1),
            other => panic!("expected snapshot, got {:?}", other),
        }

        let second = store.insert_message("u2", "second").unwrap();
        match listener.events.recv().await {
            Some(FeedEvent::Snapshot(s)) => {
                assert_eq!(s.len(), 2);
                assert_eq!(s[1], second);
            }
            other => panic!("expected snapshot, got {:?}", other),
        }

        assert!(store.delete_message(&second.id));
        match listener.events.recv().await {
            Some(FeedEvent::Snapshot(s)) => assert_eq!(s.len(), 1),
            other => panic!("expected snapshot, got {:?}", other),
        }
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let store = MemoryStore::new();
        let listener = store.listen_messages();
        assert_eq!(store.active_listeners(), 1);
        drop(listener);
        assert_eq!(store.active_listeners(), 0);
    }

    #[test]
    fn test_profile_merge_and_failures() {
        let store = MemoryStore::new();
        store
            .merge_profile("u1", &ProfileUpdate::Nickname("Alice".to_string()))
            .unwrap();
        store
            .merge_profile("u1", &ProfileUpdate::AvatarUrl("https://img/a.png".to_string()))
            .unwrap();

        let doc = store.get_profile("u1").unwrap().unwrap();
        assert_eq!(doc.nickname.as_deref(), Some("Alice"));
        assert_eq!(doc.photo_url.as_deref(), Some("https://img/a.png"));
        assert_eq!(store.profile_reads(), 1);
        assert_eq!(store.profile_writes(), 2);

        store.set_fail_writes(true);
        assert!(store
            .merge_profile("u1", &ProfileUpdate::Nickname("Mallory".to_string()))
            .is_err());
        assert!(store.insert_message("u1", "nope").is_err());
        assert!(store.messages().is_empty());

        store.set_fail_reads(true);
        assert!(store.get_profile("u1").is_err());
    }
}
