// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Protected routes accept session tokens from the header or the cookie
//! 3. CORS preflight requests return correct headers

use alia_chat::middleware::auth::create_jwt;
use alia_chat::models::{AuthProvider, Identity};
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};

mod common;
use common::{body_json, create_test_app, get_request};

fn github_identity() -> Identity {
    Identity {
        uid: "gh-42".to_string(),
        display_name: Some("Octo Cat".to_string()),
        email: Some("octo@example.com".to_string()),
        photo_url: Some("https://img/octo.png".to_string()),
        provider: AuthProvider::GitHub,
    }
}

#[tokio::test]
async fn test_health_is_public() {
    let app = create_test_app();
    let response = app.send(get_request("/health", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn test_unknown_route_is_json_404() {
    let app = create_test_app();
    let response = app.send(get_request("/api/nope/really", None)).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "not_found");
    assert_eq!(body["details"], "No route for /api/nope/really");
}

#[tokio::test]
async fn test_protected_routes_require_auth() {
    let app = create_test_app();

    for uri in ["/api/me", "/api/feed", "/api/feed/stream", "/api/profiles/u1"] {
        let response = app.send(get_request(uri, None)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body_json(response).await["error"], "unauthorized");
    }
}

#[tokio::test]
async fn test_invalid_token_rejected() {
    let app = create_test_app();

    let response = app.send(get_request("/api/me", Some("not.a.jwt"))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "invalid_token");

    // Signed with a different key
    let forged = create_jwt(&github_identity(), b"some_other_key_entirely_0123456").unwrap();
    let response = app.send(get_request("/api/me", Some(&forged))).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_bearer_token_accepted() {
    let app = create_test_app();
    let token = create_jwt(&github_identity(), &app.state.config.jwt_signing_key).unwrap();

    let response = app.send(get_request("/api/me", Some(&token))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let me = body_json(response).await;
    assert_eq!(me["uid"], "gh-42");
    assert_eq!(me["provider"], "GitHub");
    assert_eq!(me["nickname_required"], true);
    assert_eq!(me["is_admin"], false);
    // First sign-in seeds the avatar from the identity
    assert_eq!(me["profile"]["avatar_url"], "https://img/octo.png");
    assert_eq!(me["profile"]["display_name"], "Anon");

    // The request started a session for this user
    assert!(app.state.sessions.get("gh-42").is_some());
}

#[tokio::test]
async fn test_cookie_token_accepted() {
    let app = create_test_app();
    let token = create_jwt(&github_identity(), &app.state.config.jwt_signing_key).unwrap();

    let response = app
        .send(
            Request::builder()
                .uri("/api/me")
                .header(header::COOKIE, format!("alia_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = create_test_app();

    let response = app
        .send(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/messages")
                .header(header::ORIGIN, "http://localhost:5173")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:5173"
    );
    assert_eq!(
        headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(),
        "true"
    );
}

#[tokio::test]
async fn test_cors_rejects_unknown_origin() {
    let app = create_test_app();

    let response = app
        .send(
            Request::builder()
                .uri("/health")
                .header(header::ORIGIN, "https://evil.example.com")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}
