// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use alia_chat::error::{AppError, AuthError};
use axum::http::StatusCode;
use axum::response::IntoResponse;

async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_status_mapping() {
    let cases = [
        (AppError::Validation("empty".to_string()), StatusCode::BAD_REQUEST),
        (AppError::Auth(AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED),
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED),
        (AppError::InvalidToken, StatusCode::UNAUTHORIZED),
        (AppError::Forbidden("no".to_string()), StatusCode::FORBIDDEN),
        (AppError::NotFound("gone".to_string()), StatusCode::NOT_FOUND),
        (AppError::Backend("down".to_string()), StatusCode::BAD_GATEWAY),
        (
            AppError::Internal(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR,
        ),
    ];

    for (err, expected) in cases {
        let (status, _) = render(err).await;
        assert_eq!(status, expected);
    }
}

#[tokio::test]
async fn test_validation_details_exposed() {
    let (_, body) = render(AppError::Validation("Message text is empty".to_string())).await;
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["details"], "Message text is empty");
}

#[tokio::test]
async fn test_backend_details_hidden() {
    let (_, body) = render(AppError::Backend("connection reset by 10.0.0.7".to_string())).await;
    assert_eq!(body["error"], "backend_error");
    assert!(body.get("details").is_none());

    let (_, body) = render(AppError::Internal(anyhow::anyhow!("secret path"))).await;
    assert_eq!(body["error"], "internal_error");
    assert!(body.get("details").is_none());
}

#[test]
fn test_is_validation() {
    assert!(AppError::Validation("x".to_string()).is_validation());
    assert!(!AppError::Backend("x".to_string()).is_validation());
    assert!(!AppError::Auth(AuthError::Cancelled).is_validation());
}

#[test]
fn test_auth_error_converts() {
    let err: AppError = AuthError::EmailExists.into();
    assert!(matches!(err, AppError::Auth(AuthError::EmailExists)));
    assert_eq!(
        err.to_string(),
        "Sign-in failed: An account already exists for this email"
    );
}
