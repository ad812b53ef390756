// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Messages (append-only inserts and a live listen)
//! - Profiles (point reads and single-field merge writes)

use crate::db::{collections, FeedEvent, FeedListener};
use crate::error::AppError;
use crate::models::{FeedView, Message, ProfileDoc, ProfileUpdate};
use chrono::Utc;
use firestore::{
    FirestoreFieldTransform, FirestoreFieldTransformType, FirestoreListenEvent,
    FirestoreListener, FirestoreListenerTarget, FirestoreMemListenStateStorage,
    FirestoreTimestamp, FirestoreTransformServerValue, FirestoreWritePrecondition,
};
use gcloud_sdk::google::firestore::v1::value::ValueType;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Listener type used for the message collection.
pub type MessageListener = FirestoreListener<firestore::FirestoreDb, FirestoreMemListenStateStorage>;

const MESSAGES_TARGET: FirestoreListenerTarget = FirestoreListenerTarget::new(1);

/// Server-assigned creation time of a message, also the listen sort key.
const TIMESTAMP_FIELD: &str = "timestamp";

// Listen target change types (google.firestore.v1.TargetChange.TargetChangeType)
const TARGET_REMOVE: i32 = 2;
const TARGET_CURRENT: i32 = 3;

/// Stored message document.
///
/// Writes carry `uid` and `text`; `timestamp` is filled in by the server
/// through a field transform. Documents without it fall back to their
/// create time when read.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MessageDoc {
    #[serde(alias = "_firestore_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    uid: String,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<FirestoreTimestamp>,
    #[serde(
        alias = "_firestore_created",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    created: Option<FirestoreTimestamp>,
}

impl MessageDoc {
    fn into_message(self) -> Option<Message> {
        let created_at = self.timestamp.or(self.created)?.0;
        Some(Message {
            id: self.id?,
            author_uid: self.uid,
            text: self.text,
            created_at,
        })
    }
}

/// Ordered view plus listen progress for one message listener.
#[derive(Default)]
struct ListenState {
    view: FeedView,
    current: bool,
}

impl ListenState {
    /// Fold one listen event into the view, returning the event to publish.
    ///
    /// Nothing is published until the target is current, so the initial
    /// load yields a single snapshot.
    fn apply(&mut self, event: FirestoreListenEvent) -> Option<FeedEvent> {
        match event {
            FirestoreListenEvent::TargetChange(change) => {
                if change.target_change_type == TARGET_REMOVE {
                    let reason = change
                        .cause
                        .map(|status| status.message)
                        .unwrap_or_else(|| "listen target removed".to_string());
                    return Some(FeedEvent::Error(reason));
                }
                if change.target_change_type == TARGET_CURRENT && !self.current {
                    self.current = true;
                    return Some(FeedEvent::Snapshot(self.view.snapshot()));
                }
                None
            }
            FirestoreListenEvent::DocumentChange(change) => {
                let doc = change.document?;
                match firestore::FirestoreDb::deserialize_doc_to::<MessageDoc>(&doc) {
                    Ok(parsed) => match parsed.into_message() {
                        Some(message) => self.view.upsert(message),
                        None => {
                            tracing::warn!(doc = %doc.name, "Skipping message without id or timestamp");
                            return None;
                        }
                    },
                    Err(e) => {
                        tracing::warn!(doc = %doc.name, error = %e, "Skipping malformed message");
                        return None;
                    }
                }
                self.publish_if_current()
            }
            FirestoreListenEvent::DocumentDelete(delete) => {
                self.view.remove(document_id(&delete.document));
                self.publish_if_current()
            }
            FirestoreListenEvent::DocumentRemove(remove) => {
                self.view.remove(document_id(&remove.document));
                self.publish_if_current()
            }
            _ => None,
        }
    }

    fn publish_if_current(&self) -> Option<FeedEvent> {
        self.current
            .then(|| FeedEvent::Snapshot(self.view.snapshot()))
    }
}

/// Transform setting the message timestamp to the commit time.
fn server_timestamp() -> FirestoreFieldTransform {
    FirestoreFieldTransform::new(
        TIMESTAMP_FIELD.to_string(),
        FirestoreFieldTransformType::SetToServerValue(FirestoreTransformServerValue::RequestTime),
    )
}

/// Last path segment of a full document name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Backend(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        // The emulator accepts any bearer token; hand it an unsigned one.
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJlbXVsYXRvciJ9."
                        .to_string()
                        .into(),
                ),
                expiry: Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| AppError::Backend(format!("Failed to connect to Firestore Emulator: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Backend("Database not connected (offline mode)".to_string()))
    }

    // ─── Message Operations ──────────────────────────────────────

    /// Insert a message with a generated document id.
    ///
    /// The write must create the document and sets `timestamp` on the
    /// server in the same request.
    pub async fn insert_message(&self, author_uid: &str, text: &str) -> Result<Message, AppError> {
        let client = self.get_client()?;
        let id = uuid::Uuid::now_v7().simple().to_string();
        let doc = MessageDoc {
            id: None,
            uid: author_uid.to_string(),
            text: text.to_string(),
            timestamp: None,
            created: None,
        };

        let writer = client
            .create_simple_batch_writer()
            .await
            .map_err(|e| AppError::Backend(e.to_string()))?;
        let mut batch = writer.new_batch();
        client
            .fluent()
            .update()
            .in_col(collections::MESSAGES)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&id)
            .object(&doc)
            .transforms(|_| vec![server_timestamp()])
            .add_to_batch(&mut batch)
            .map_err(|e| AppError::Backend(e.to_string()))?;

        let response = batch
            .write()
            .await
            .map_err(|e| AppError::Backend(e.to_string()))?;
        if let Some(status) = response.statuses.iter().find(|s| s.code != 0) {
            return Err(AppError::Backend(format!(
                "Message write rejected: {}",
                status.message
            )));
        }

        let created_at = response
            .write_results
            .first()
            .and_then(|result| {
                result
                    .transform_results
                    .first()
                    .and_then(|value| match &value.value.value_type {
                        Some(ValueType::TimestampValue(ts)) => {
                            firestore::timestamp_utils::from_timestamp(ts.clone()).ok()
                        }
                        _ => None,
                    })
                    .or(result.update_time)
            })
            .ok_or_else(|| AppError::Backend("Message write returned no timestamp".to_string()))?;

        Ok(Message {
            id,
            author_uid: doc.uid,
            text: doc.text,
            created_at,
        })
    }

    /// Start listening to the message collection.
    ///
    /// Change events are folded into an ordered view; each consistent
    /// state is published as a full snapshot.
    pub async fn listen_messages(&self) -> Result<FeedListener, AppError> {
        let client = self.get_client()?;

        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Backend(format!("Failed to create listener: {}", e)))?;

        client
            .fluent()
            .select()
            .from(collections::MESSAGES)
            .listen()
            .add_target(MESSAGES_TARGET, &mut listener)
            .map_err(|e| AppError::Backend(format!("Failed to add listen target: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(ListenState::default()));

        listener
            .start(move |event| {
                let state = state.clone();
                let tx = tx.clone();
                async move {
                    let outgoing = {
                        let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
                        state.apply(event)
                    };
                    if let Some(event) = outgoing {
                        // Receiver gone means the subscription was cancelled
                        let _ = tx.send(event);
                    }
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Backend(format!("Failed to start listener: {}", e)))?;

        tracing::debug!("Message listener started");

        Ok(FeedListener::firestore(rx, listener))
    }

    // ─── Profile Operations ──────────────────────────────────────

    /// Get a profile document by user id.
    pub async fn get_profile(&self, uid: &str) -> Result<Option<ProfileDoc>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AppError::Backend(e.to_string()))
    }

    /// Merge-write a single profile field.
    ///
    /// The update mask names only the changed field, so the rest of the
    /// document is left untouched.
    pub async fn merge_profile(&self, uid: &str, update: &ProfileUpdate) -> Result<(), AppError> {
        let doc = ProfileDoc::from_update(update);

        let _: ProfileDoc = self
            .get_client()?
            .fluent()
            .update()
            .fields([update.field_name()])
            .in_col(collections::USERS)
            .document_id(uid)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| AppError::Backend(e.to_string()))?;
        Ok(())
    }
}
