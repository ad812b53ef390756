// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Chat sessions: one per signed-in user.
//!
//! A session ties the pieces together for one user:
//! - its own `ProfileResolver` (dropped, with its cache, on sign-out)
//! - at most one live feed subscription
//! - a renderer turning feed snapshots into display entries, published
//!   on a `watch` channel for the HTTP and SSE handlers
//!
//! Sign-in always tears down whatever the previous sign-in left behind
//! before subscribing again.

use crate::db::ChatDb;
use crate::error::{AppError, Result};
use crate::models::{Identity, Message, Profile, ProfileUpdate};
use crate::services::feed::{FeedSubscription, FeedSynchronizer};
use crate::services::messages::MessageService;
use crate::services::notify::NotificationTracker;
use crate::services::profiles::ProfileResolver;
use crate::time_utils::{format_time_label, format_utc_rfc3339};
use dashmap::DashMap;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One rendered message line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FeedEntry {
    pub id: String,
    pub author_uid: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub text: String,
    /// RFC3339 creation time
    pub created_at: String,
    pub time_label: String,
    /// Written by the session's own user
    pub own: bool,
}

/// Feed state as shown to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RenderedFeed {
    pub signed_in: bool,
    pub entries: Vec<FeedEntry>,
    /// Ids of newly arrived messages to notify about
    pub notify: Vec<String>,
}

/// Result of signing a session in.
#[derive(Debug, Clone)]
pub struct SignInOutcome {
    pub profile: Profile,
    pub nickname_required: bool,
}

/// Fences renders from a previous sign-in.
///
/// Every sign-in and sign-out advances the generation; a renderer may only
/// publish while its generation is current.
#[derive(Default)]
struct PublishGate {
    generation: StdMutex<u64>,
}

impl PublishGate {
    fn advance(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        *generation
    }

    fn publish(&self, generation: u64, publish: impl FnOnce()) -> bool {
        let current = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        if *current != generation {
            return false;
        }
        publish();
        true
    }
}

/// Work for the renderer.
enum RenderRequest {
    /// A new feed snapshot
    Snapshot(Vec<Message>),
    /// Render the last snapshot again (profiles changed)
    Refresh,
}

/// State of a signed-in session.
struct Active {
    identity: Identity,
    resolver: Arc<ProfileResolver>,
    subscription: FeedSubscription,
    renderer: JoinHandle<()>,
    render_tx: mpsc::UnboundedSender<RenderRequest>,
    nickname_required: bool,
}

impl Active {
    fn refresh(&self) {
        // Renderer gone means the session is being torn down
        let _ = self.render_tx.send(RenderRequest::Refresh);
    }
}

/// Everything the server keeps for one signed-in user.
pub struct ChatSession {
    db: ChatDb,
    feed: FeedSynchronizer,
    messages: MessageService,
    active: Mutex<Option<Active>>,
    gate: Arc<PublishGate>,
    auth_tx: watch::Sender<Option<Identity>>,
    feed_tx: Arc<watch::Sender<RenderedFeed>>,
    last_active: StdMutex<Instant>,
}

impl ChatSession {
    pub fn new(db: ChatDb, feed_window: usize) -> Self {
        let (auth_tx, _) = watch::channel(None);
        let (feed_tx, _) = watch::channel(RenderedFeed::default());

        Self {
            feed: FeedSynchronizer::new(db.clone(), feed_window),
            messages: MessageService::new(db.clone()),
            db,
            active: Mutex::new(None),
            gate: Arc::new(PublishGate::default()),
            auth_tx,
            feed_tx: Arc::new(feed_tx),
            last_active: StdMutex::new(Instant::now()),
        }
    }

    /// Record activity on behalf of the session's user.
    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    /// No open feed stream and no request for at least `max_idle`.
    ///
    /// An open stream counts as activity.
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        if self.feed_tx.receiver_count() > 0 {
            self.touch();
            return false;
        }
        self.last_active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
            >= max_idle
    }

    /// Sign in, replacing any previous sign-in of this session.
    pub async fn sign_in(&self, identity: Identity) -> Result<SignInOutcome> {
        let mut active = self.active.lock().await;
        self.start(&mut active, identity).await
    }

    /// Sign in unless already signed in as this user.
    pub async fn ensure_signed_in(&self, identity: &Identity) -> Result<()> {
        let mut active = self.active.lock().await;
        if active
            .as_ref()
            .is_some_and(|a| a.identity.uid == identity.uid)
        {
            return Ok(());
        }
        self.start(&mut active, identity.clone()).await?;
        Ok(())
    }

    /// Cancel the feed, drop the profile cache and publish the signed-out state.
    pub async fn sign_out(&self) {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(previous) => {
                let uid = previous.identity.uid.clone();
                self.stop(previous).await;
                tracing::info!(uid = %uid, "Signed out");
            }
            None => tracing::debug!("Sign-out on a signed-out session"),
        }
    }

    async fn start(&self, slot: &mut Option<Active>, identity: Identity) -> Result<SignInOutcome> {
        if let Some(previous) = slot.take() {
            self.stop(previous).await;
        }

        let resolver = Arc::new(ProfileResolver::new(self.db.clone()));
        let profile = resolver.resolve_or_create(&identity).await?;
        let nickname_required = profile.needs_nickname();

        let generation = self.gate.advance();
        let (render_tx, rx) = mpsc::unbounded_channel();
        let renderer = tokio::spawn(run_renderer(
            rx,
            resolver.clone(),
            identity.uid.clone(),
            self.gate.clone(),
            generation,
            self.feed_tx.clone(),
        ));

        let tx = render_tx.clone();
        let subscription = match self
            .feed
            .subscribe(move |snapshot| {
                let _ = tx.send(RenderRequest::Snapshot(snapshot));
            })
            .await
        {
            Ok(subscription) => subscription,
            Err(e) => {
                renderer.abort();
                return Err(e);
            }
        };

        tracing::info!(
            uid = %identity.uid,
            provider = identity.provider.label(),
            nickname_required,
            "Chat session started"
        );

        self.auth_tx.send_replace(Some(identity.clone()));
        *slot = Some(Active {
            identity,
            resolver,
            subscription,
            renderer,
            render_tx,
            nickname_required,
        });

        Ok(SignInOutcome {
            profile,
            nickname_required,
        })
    }

    async fn stop(&self, active: Active) {
        // Synchronous: no snapshot reaches the renderer after this
        active.subscription.cancel();
        self.gate.advance();
        active.renderer.abort();
        active.resolver.clear();
        active.subscription.shutdown().await;

        self.feed_tx.send_replace(RenderedFeed::default());
        self.auth_tx.send_replace(None);
    }

    async fn signed_in(&self) -> Result<(Identity, Arc<ProfileResolver>)> {
        let active = self.active.lock().await;
        active
            .as_ref()
            .map(|a| (a.identity.clone(), a.resolver.clone()))
            .ok_or(AppError::Unauthorized)
    }

    /// Current identity, if signed in.
    pub fn identity(&self) -> Option<Identity> {
        self.auth_tx.borrow().clone()
    }

    /// Auth-state changes (`None` when signed out).
    pub fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.auth_tx.subscribe()
    }

    /// Rendered feed updates.
    pub fn feed_updates(&self) -> watch::Receiver<RenderedFeed> {
        self.feed_tx.subscribe()
    }

    pub fn current_feed(&self) -> RenderedFeed {
        self.feed_tx.borrow().clone()
    }

    /// The signed-in user's own profile.
    pub async fn profile(&self) -> Result<Profile> {
        let (identity, resolver) = self.signed_in().await?;
        resolver.try_resolve(&identity.uid).await
    }

    /// Whether the user still has to answer the nickname prompt.
    pub async fn nickname_required(&self) -> bool {
        self.active
            .lock()
            .await
            .as_ref()
            .is_some_and(|a| a.nickname_required)
    }

    /// Answer the nickname prompt (once per sign-in).
    ///
    /// A blank answer falls back to a name derived from the identity.
    /// Afterwards only an administrator can change the nickname.
    pub async fn choose_nickname(&self, answer: Option<&str>) -> Result<Profile> {
        let mut active = self.active.lock().await;
        let active = active.as_mut().ok_or(AppError::Unauthorized)?;
        if !active.nickname_required {
            return Err(AppError::Forbidden(
                "Nickname can only be changed by an administrator".to_string(),
            ));
        }

        let nickname = crate::models::profile::choose_nickname(answer, &active.identity);
        let profile = active
            .resolver
            .set_own_profile(&active.identity.uid, ProfileUpdate::Nickname(nickname))
            .await?;
        active.nickname_required = false;
        active.refresh();

        tracing::info!(uid = %active.identity.uid, nickname = %profile.display_name, "Nickname chosen");
        Ok(profile)
    }

    pub async fn set_notifications(&self, enabled: bool) -> Result<Profile> {
        let (identity, resolver) = self.signed_in().await?;
        resolver
            .set_own_profile(&identity.uid, ProfileUpdate::NotificationsEnabled(enabled))
            .await
    }

    /// Post a message as the signed-in user.
    pub async fn post(&self, text: &str) -> Result<Message> {
        let (identity, _) = self.signed_in().await?;
        self.messages.post(&identity.uid, text).await
    }

    /// Profile of any user, degraded to the default on read failure.
    pub async fn resolve_profile(&self, uid: &str) -> Result<Profile> {
        let (_, resolver) = self.signed_in().await?;
        Ok(resolver.resolve(uid).await)
    }

    /// Set another user's nickname. Permission is checked by the caller.
    pub async fn override_nickname(&self, target_uid: &str, nickname: &str) -> Result<Profile> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(AppError::Validation("Nickname is empty".to_string()));
        }

        let active = self.active.lock().await;
        let active = active.as_ref().ok_or(AppError::Unauthorized)?;
        let identity = &active.identity;
        let profile = active
            .resolver
            .set_profile(target_uid, ProfileUpdate::Nickname(nickname.to_string()))
            .await?;
        active.refresh();

        tracing::info!(
            actor = %identity.uid,
            target = %target_uid,
            nickname = %nickname,
            "Nickname overridden"
        );
        Ok(profile)
    }
}

/// Render snapshots for one sign-in until the feed ends or the
/// generation moves on.
async fn run_renderer(
    mut requests: mpsc::UnboundedReceiver<RenderRequest>,
    resolver: Arc<ProfileResolver>,
    own_uid: String,
    gate: Arc<PublishGate>,
    generation: u64,
    feed_tx: Arc<watch::Sender<RenderedFeed>>,
) {
    let mut tracker = NotificationTracker::new();
    let mut latest: Option<Vec<Message>> = None;

    while let Some(request) = requests.recv().await {
        // Only the latest state matters
        let mut pending = Some(request);
        while let Some(request) = pending.take().or_else(|| requests.try_recv().ok()) {
            if let RenderRequest::Snapshot(snapshot) = request {
                latest = Some(snapshot);
            }
        }
        let Some(snapshot) = latest.as_deref() else {
            continue;
        };

        let entries = render_entries(&resolver, snapshot, &own_uid).await;
        let notifications = resolver
            .cached(&own_uid)
            .is_some_and(|p| p.notifications_enabled);
        let notify = tracker.observe(snapshot, &own_uid, notifications);
        if !notify.is_empty() {
            tracing::debug!(uid = %own_uid, count = notify.len(), "New messages to notify");
        }

        let rendered = RenderedFeed {
            signed_in: true,
            entries,
            notify,
        };
        if !gate.publish(generation, || {
            feed_tx.send_replace(rendered);
        }) {
            break;
        }
    }
}

/// Pair each message with its author's profile.
async fn render_entries(
    resolver: &ProfileResolver,
    snapshot: &[Message],
    own_uid: &str,
) -> Vec<FeedEntry> {
    let authors: BTreeSet<&str> = snapshot.iter().map(|m| m.author_uid.as_str()).collect();
    let profiles: HashMap<&str, Profile> = join_all(
        authors
            .into_iter()
            .map(|uid| async move { (uid, resolver.resolve(uid).await) }),
    )
    .await
    .into_iter()
    .collect();

    snapshot
        .iter()
        .map(|message| {
            let profile = profiles
                .get(message.author_uid.as_str())
                .cloned()
                .unwrap_or_else(|| Profile::anonymous(&message.author_uid));
            FeedEntry {
                id: message.id.clone(),
                author_uid: message.author_uid.clone(),
                display_name: profile.display_name,
                avatar_url: profile.avatar_url,
                text: message.text.clone(),
                created_at: format_utc_rfc3339(message.created_at),
                time_label: format_time_label(message.created_at),
                own: message.author_uid == own_uid,
            }
        })
        .collect()
}

/// Signed-in users and their sessions.
///
/// Several browser tabs of the same user share one session.
pub struct SessionRegistry {
    db: ChatDb,
    feed_window: usize,
    sessions: DashMap<String, Arc<ChatSession>>,
}

impl SessionRegistry {
    pub fn new(db: ChatDb, feed_window: usize) -> Self {
        Self {
            db,
            feed_window,
            sessions: DashMap::new(),
        }
    }

    fn session_for(&self, uid: &str) -> Arc<ChatSession> {
        let session = self
            .sessions
            .entry(uid.to_string())
            .or_insert_with(|| Arc::new(ChatSession::new(self.db.clone(), self.feed_window)))
            .clone();
        session.touch();
        session
    }

    /// Fresh sign-in: (re)starts the user's session.
    pub async fn open(&self, identity: Identity) -> Result<(Arc<ChatSession>, SignInOutcome)> {
        let session = self.session_for(&identity.uid);
        let outcome = session.sign_in(identity).await?;
        Ok((session, outcome))
    }

    /// Session for an authenticated request, starting one if the server
    /// has none (e.g. after a restart).
    pub async fn resume(&self, identity: &Identity) -> Result<Arc<ChatSession>> {
        let session = self.session_for(&identity.uid);
        session.ensure_signed_in(identity).await?;
        Ok(session)
    }

    pub fn get(&self, uid: &str) -> Option<Arc<ChatSession>> {
        self.sessions.get(uid).map(|s| s.clone())
    }

    /// Sign out and forget the user's session.
    pub async fn close(&self, uid: &str) -> bool {
        match self.sessions.remove(uid) {
            Some((_, session)) => {
                session.sign_out().await;
                true
            }
            None => false,
        }
    }

    /// Close every session idle for at least `max_idle`.
    ///
    /// Returns the number of sessions closed. A later request with a
    /// valid token resumes the session.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let candidates: Vec<(String, Arc<ChatSession>)> = self
            .sessions
            .iter()
            .filter(|entry| entry.value().is_idle(max_idle))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut evicted = 0;
        for (uid, candidate) in candidates {
            // Skip sessions replaced or used since the scan
            let removed = self.sessions.remove_if(&uid, |_, session| {
                Arc::ptr_eq(session, &candidate) && session.is_idle(max_idle)
            });
            if let Some((_, session)) = removed {
                session.sign_out().await;
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, remaining = self.sessions.len(), "Evicted idle sessions");
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
