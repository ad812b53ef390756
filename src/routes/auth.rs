// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in and sign-out routes.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::error::Result;
use crate::middleware::auth::{
    create_jwt, extract_token, verify_jwt, SESSION_COOKIE, SESSION_TTL_SECS,
};
use crate::routes::api::MeResponse;
use crate::services::{OAuthCredential, SignInMethod};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/sign-in", post(sign_in))
        .route("/auth/sign-out", post(sign_out))
}

/// Sign-in request body.
#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    /// `google`, `github`, `microsoft`, `email` or `signup-email`
    #[validate(length(min = 1, max = 32))]
    pub method: String,
    #[serde(default)]
    #[validate(length(max = 320))]
    pub email: Option<String>,
    #[serde(default)]
    #[validate(length(max = 4096))]
    pub password: Option<String>,
    /// Provider credential from the browser popup
    #[serde(default)]
    #[validate(length(max = 16384))]
    pub id_token: Option<String>,
    #[serde(default)]
    #[validate(length(max = 16384))]
    pub access_token: Option<String>,
}

/// Session cookie with the given value and lifetime.
fn session_cookie(value: String, secure: bool, max_age: time::Duration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .max_age(max_age)
        .build()
}

/// Authenticate with the identity provider and start a chat session.
async fn sign_in(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<SignInRequest>,
) -> Result<(CookieJar, Json<MeResponse>)> {
    body.validate()?;

    let method = SignInMethod::parse(
        body.method.trim(),
        body.email.as_deref(),
        body.password.as_deref(),
        OAuthCredential {
            id_token: body.id_token,
            access_token: body.access_token,
        },
    )?;

    let identity = state.identity.sign_in(&method).await?;
    let (_, outcome) = state.sessions.open(identity.clone()).await?;

    let token = create_jwt(&identity, &state.config.jwt_signing_key)?;
    let jar = jar.add(session_cookie(
        token,
        state.config.secure_cookies(),
        time::Duration::seconds(SESSION_TTL_SECS as i64),
    ));

    let is_admin = state.policy.is_admin(&identity.uid);
    Ok((
        jar,
        Json(MeResponse::new(
            &identity,
            outcome.profile,
            outcome.nickname_required,
            is_admin,
        )),
    ))
}

/// End the chat session and clear the cookie.
///
/// Always succeeds; a missing or invalid token just means there is no
/// session to close.
async fn sign_out(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> (StatusCode, CookieJar) {
    if let Some(token) = extract_token(&jar, &headers) {
        match verify_jwt(&token, &state.config.jwt_signing_key) {
            Ok(identity) => {
                if !state.sessions.close(&identity.uid).await {
                    tracing::debug!(uid = %identity.uid, "No active session to close");
                }
            }
            Err(_) => tracing::debug!("Sign-out with invalid session token"),
        }
    }

    let jar = jar.add(session_cookie(
        String::new(),
        state.config.secure_cookies(),
        time::Duration::ZERO,
    ));

    (StatusCode::NO_CONTENT, jar)
}
