// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Feed synchronizer: live, ordered message snapshots.
//!
//! A subscription delivers the most recent `window` messages (oldest
//! first) to a callback on subscribe and after every change to the
//! collection. Deliveries for one subscription never overlap, and once
//! [`FeedSubscription::cancel`] returns no further callback runs.

use crate::db::{ChatDb, FeedEvent};
use crate::error::{AppError, Result};
use crate::models::message::latest_window;
use crate::models::Message;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Subscribes to the message collection.
#[derive(Clone)]
pub struct FeedSynchronizer {
    db: ChatDb,
    window: usize,
}

impl FeedSynchronizer {
    pub fn new(db: ChatDb, window: usize) -> Self {
        Self {
            db,
            window: window.max(1),
        }
    }

    /// Subscribe with errors logged and otherwise dropped.
    pub async fn subscribe<F>(&self, on_change: F) -> Result<FeedSubscription>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
    {
        self.subscribe_with_errors(on_change, |err| {
            tracing::warn!(error = %err, "Feed subscription error");
        })
        .await
    }

    /// Subscribe, reporting listen failures to `on_error`.
    ///
    /// Failures are not retried; reconnection belongs to the backend
    /// client's transport.
    pub async fn subscribe_with_errors<F, E>(
        &self,
        mut on_change: F,
        mut on_error: E,
    ) -> Result<FeedSubscription>
    where
        F: FnMut(Vec<Message>) + Send + 'static,
        E: FnMut(AppError) + Send + 'static,
    {
        let mut listener = self.db.listen_messages().await?;
        let gate = Arc::new(DeliveryGate::new());
        let cancelled = Arc::new(Notify::new());
        let window = self.window;

        let task_gate = gate.clone();
        let task_cancelled = cancelled.clone();
        let task = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = task_cancelled.notified() => break,
                    event = listener.events.recv() => event,
                };

                match event {
                    Some(FeedEvent::Snapshot(messages)) => {
                        let visible = latest_window(&messages, window).to_vec();
                        tracing::debug!(
                            total = messages.len(),
                            delivered = visible.len(),
                            "Feed snapshot"
                        );
                        task_gate.deliver(|| on_change(visible));
                    }
                    Some(FeedEvent::Error(reason)) => {
                        task_gate.deliver(|| on_error(AppError::Backend(reason)));
                    }
                    None => break,
                }
            }

            listener.shutdown().await;
            tracing::debug!("Feed subscription stopped");
        });

        Ok(FeedSubscription {
            gate,
            cancelled,
            task: Some(task),
        })
    }
}

/// Serializes callback delivery against cancellation.
struct DeliveryGate {
    open: Mutex<bool>,
}

impl DeliveryGate {
    fn new() -> Self {
        Self {
            open: Mutex::new(true),
        }
    }

    /// Run `deliver` if still open; holds the gate for the duration.
    fn deliver(&self, deliver: impl FnOnce()) -> bool {
        let open = self.open.lock().unwrap_or_else(|e| e.into_inner());
        if *open {
            deliver();
        }
        *open
    }

    /// Close the gate, waiting out a delivery in progress.
    fn close(&self) {
        *self.open.lock().unwrap_or_else(|e| e.into_inner()) = false;
    }

    fn is_open(&self) -> bool {
        *self.open.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to a live feed subscription. Dropping it cancels.
pub struct FeedSubscription {
    gate: Arc<DeliveryGate>,
    cancelled: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Stop deliveries.
    ///
    /// Blocks until an in-flight callback finishes, so it must not be
    /// called from inside this subscription's own callback.
    pub fn cancel(&self) {
        self.gate.close();
        self.cancelled.notify_one();
    }

    pub fn is_active(&self) -> bool {
        self.gate.is_open()
    }

    /// Cancel and wait for the listener to shut down.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Feed task ended abnormally");
            }
        }
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}
