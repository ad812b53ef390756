// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use alia_chat::config::Config;
use alia_chat::db::{ChatDb, FirestoreDb, MemoryStore};
use alia_chat::routes::create_router;
use alia_chat::services::{IdentityService, MemoryDirectory};
use alia_chat::AppState;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// App wired to in-memory backends, with handles to both.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
    pub directory: Arc<MemoryDirectory>,
}

#[allow(dead_code)]
impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Register an email account through the API and return its session token.
    pub async fn sign_up(&self, email: &str) -> (String, Value) {
        let response = self
            .send(json_request(
                "POST",
                "/auth/sign-in",
                None,
                serde_json::json!({
                    "method": "signup-email",
                    "email": email,
                    "password": "correct horse",
                }),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let token = session_token(&response).expect("sign-in should set the session cookie");
        (token, body_json(response).await)
    }

    /// Poll `GET /api/feed` until `pred` holds.
    pub async fn wait_for_feed(&self, token: &str, pred: impl Fn(&Value) -> bool) -> Value {
        for _ in 0..100 {
            let response = self.send(get_request("/api/feed", Some(token))).await;
            assert_eq!(response.status(), StatusCode::OK);
            let feed = body_json(response).await;
            if pred(&feed) {
                return feed;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("feed never reached the expected state");
    }
}

/// Create a test app with the default test config.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with_config(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with_frontend_url(frontend_url: &str) -> TestApp {
    let mut config = Config::test_default();
    config.frontend_url = frontend_url.to_string();
    create_test_app_with_config(config)
}

#[allow(dead_code)]
pub fn create_test_app_with_config(config: Config) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());

    let state = Arc::new(AppState::new(
        config,
        ChatDb::memory(store.clone()),
        IdentityService::memory(directory.clone()),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        store,
        directory,
    }
}

#[allow(dead_code)]
pub fn json_request(method: &str, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[allow(dead_code)]
pub fn get_request(uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

#[allow(dead_code)]
pub async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// All `Set-Cookie` header values of a response.
#[allow(dead_code)]
pub fn set_cookie_headers(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Value of the session cookie set by a response.
#[allow(dead_code)]
pub fn session_token(response: &Response) -> Option<String> {
    set_cookie_headers(response).into_iter().find_map(|cookie| {
        cookie
            .split(';')
            .next()
            .and_then(|pair| pair.strip_prefix("alia_token="))
            .map(String::from)
    })
}
