// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session cookie tests.
//!
//! These tests verify the cookie set on sign-in and the removal cookie on
//! sign-out carry matching attributes for localhost and production-style
//! frontends.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use serde_json::json;

mod common;
use common::{
    body_json, create_test_app, create_test_app_with_frontend_url, json_request,
    set_cookie_headers,
};

fn find_cookie(headers: &[String], name: &str) -> String {
    headers
        .iter()
        .find(|value| value.starts_with(&format!("{name}=")))
        .cloned()
        .unwrap_or_else(|| panic!("missing Set-Cookie header for {name}: {headers:?}"))
}

#[tokio::test]
async fn test_sign_in_cookie_localhost_attributes() {
    let app = create_test_app_with_frontend_url("http://localhost:5173");

    let response = app
        .send(json_request(
            "POST",
            "/auth/sign-in",
            None,
            json!({ "method": "signup-email", "email": "a@example.com", "password": "pw123456" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = find_cookie(&set_cookie_headers(&response), "alia_token");
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=2592000"));
    assert!(!cookie.contains("Secure"));
    assert!(!cookie.contains("Domain="));

    let me = body_json(response).await;
    assert_eq!(me["provider"], "Email");
    assert_eq!(me["email"], "a@example.com");
}

#[tokio::test]
async fn test_sign_in_cookie_secure_for_https_frontend() {
    let app = create_test_app_with_frontend_url("https://chat.example.com");

    let response = app
        .send(json_request(
            "POST",
            "/auth/sign-in",
            None,
            json!({ "method": "signup-email", "email": "a@example.com", "password": "pw123456" }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = find_cookie(&set_cookie_headers(&response), "alia_token");
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("HttpOnly"));
}

#[tokio::test]
async fn test_sign_out_clears_cookie_and_session() {
    let app = create_test_app_with_frontend_url("http://localhost:5173");
    let (token, me) = app.sign_up("bye@example.com").await;
    let uid = me["uid"].as_str().unwrap().to_string();
    assert!(app.state.sessions.get(&uid).is_some());

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/auth/sign-out")
                .header(header::COOKIE, format!("alia_token={}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let cookie = find_cookie(&set_cookie_headers(&response), "alia_token");
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Lax"));
    assert!(cookie.contains("Max-Age=0"));
    assert!(!cookie.contains("Secure"));

    assert!(app.state.sessions.get(&uid).is_none());
    assert_eq!(app.store.active_listeners(), 0);
}

#[tokio::test]
async fn test_sign_out_without_cookie_still_succeeds() {
    let app = create_test_app();

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/auth/sign-out")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let cookie = find_cookie(&set_cookie_headers(&response), "alia_token");
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn test_failed_sign_in_sets_no_cookie() {
    let app = create_test_app();
    app.sign_up("known@example.com").await;

    let response = app
        .send(json_request(
            "POST",
            "/auth/sign-in",
            None,
            json!({ "method": "email", "email": "known@example.com", "password": "wrong" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(set_cookie_headers(&response).is_empty());
    assert_eq!(body_json(response).await["error"], "auth_error");
}
