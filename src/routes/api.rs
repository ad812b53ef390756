// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Identity, Message, Profile};
use crate::services::{ChatSession, RenderedFeed};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Extension, Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::Validate;

/// How long `GET /api/feed` waits for a freshly started session to render.
const FIRST_RENDER_WAIT: Duration = Duration::from_secs(5);

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/me", get(get_me))
        .route("/api/me/nickname", put(put_nickname))
        .route("/api/me/preferences", put(put_preferences))
        .route("/api/feed", get(get_feed))
        .route("/api/feed/stream", get(feed_stream))
        .route("/api/messages", post(post_message))
        .route("/api/profiles/{uid}", get(get_profile))
        .route("/api/profiles/{uid}/nickname", put(put_profile_nickname))
}

async fn session_for(state: &AppState, user: &AuthUser) -> Result<Arc<ChatSession>> {
    state.sessions.resume(&user.identity).await
}

// ─── Current User ────────────────────────────────────────────

/// Current user response.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MeResponse {
    pub uid: String,
    pub email: Option<String>,
    /// Sign-in provider label ("Google", "GitHub", "Microsoft", "Email")
    pub provider: String,
    pub profile: Profile,
    pub nickname_required: bool,
    pub is_admin: bool,
}

impl MeResponse {
    pub fn new(identity: &Identity, profile: Profile, nickname_required: bool, is_admin: bool) -> Self {
        Self {
            uid: identity.uid.clone(),
            email: identity.email.clone(),
            provider: identity.provider.label().to_string(),
            profile,
            nickname_required,
            is_admin,
        }
    }
}

async fn get_me(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<MeResponse>> {
    let session = session_for(&state, &user).await?;
    let profile = session.profile().await?;

    Ok(Json(MeResponse::new(
        &user.identity,
        profile,
        session.nickname_required().await,
        state.policy.is_admin(user.uid()),
    )))
}

#[derive(Debug, Deserialize, Validate)]
pub struct NicknameRequest {
    /// Blank or missing falls back to a name derived from the identity
    #[serde(default)]
    #[validate(length(max = 64))]
    pub nickname: Option<String>,
}

/// Answer the one-time nickname prompt.
async fn put_nickname(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NicknameRequest>,
) -> Result<Json<Profile>> {
    body.validate()?;
    let session = session_for(&state, &user).await?;
    let profile = session.choose_nickname(body.nickname.as_deref()).await?;
    Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct PreferencesRequest {
    pub notifications_enabled: bool,
}

async fn put_preferences(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PreferencesRequest>,
) -> Result<Json<Profile>> {
    let session = session_for(&state, &user).await?;
    let profile = session.set_notifications(body.notifications_enabled).await?;
    Ok(Json(profile))
}

// ─── Feed ────────────────────────────────────────────────────

/// Current rendered feed.
async fn get_feed(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RenderedFeed>> {
    let session = session_for(&state, &user).await?;

    let mut updates = session.feed_updates();
    let feed = match tokio::time::timeout(FIRST_RENDER_WAIT, updates.wait_for(|f| f.signed_in)).await {
        Ok(Ok(feed)) => feed.clone(),
        _ => {
            tracing::warn!(uid = %user.uid(), "Feed not rendered in time, returning current state");
            session.current_feed()
        }
    };

    Ok(Json(feed))
}

/// Server-sent events: one `feed` event per rendered feed.
async fn feed_stream(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let session = session_for(&state, &user).await?;
    tracing::debug!(uid = %user.uid(), "Feed stream opened");

    let updates = session.feed_updates();
    let events = stream::unfold((updates, true), |(mut updates, first)| async move {
        if !first && updates.changed().await.is_err() {
            return None;
        }
        let feed = updates.borrow_and_update().clone();
        let event = Event::default()
            .event("feed")
            .json_data(&feed)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Some((Ok(event), (updates, false)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ─── Messages ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub text: String,
}

/// Posted message response.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct MessageResponse {
    pub id: String,
    pub author_uid: String,
    pub text: String,
    pub created_at: String,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            author_uid: message.author_uid,
            text: message.text,
            created_at: format_utc_rfc3339(message.created_at),
        }
    }
}

async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageResponse>)> {
    let session = session_for(&state, &user).await?;
    let message = session.post(&body.text).await?;
    Ok((StatusCode::CREATED, Json(message.into())))
}

// ─── Profiles ────────────────────────────────────────────────

async fn get_profile(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
) -> Result<Json<Profile>> {
    let session = session_for(&state, &user).await?;
    Ok(Json(session.resolve_profile(&uid).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileNicknameRequest {
    #[validate(length(min = 1, max = 64))]
    pub nickname: String,
}

/// Set a user's nickname.
///
/// Administrators may set anyone's. Other users may only answer their
/// own nickname prompt.
async fn put_profile_nickname(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(uid): Path<String>,
    Json(body): Json<ProfileNicknameRequest>,
) -> Result<Json<Profile>> {
    body.validate()?;

    if !state.policy.can_edit_profile(user.uid(), &uid) {
        tracing::warn!(actor = %user.uid(), target = %uid, "Profile edit denied");
        return Err(AppError::Forbidden(
            "Only administrators can edit other users' profiles".to_string(),
        ));
    }

    let session = session_for(&state, &user).await?;
    let profile = if state.policy.is_admin(user.uid()) {
        session.override_nickname(&uid, &body.nickname).await?
    } else {
        session.choose_nickname(Some(&body.nickname)).await?
    };

    Ok(Json(profile))
}
