// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Alia chat API server
//!
//! Serves the shared chat room: sign-in, live feed (JSON and SSE) and
//! message posting, backed by Firestore or an in-process store.

use alia_chat::{
    config::{BackendKind, Config, ConfigError},
    db::{ChatDb, FirestoreDb, MemoryStore},
    services::{FirebaseAuthClient, IdentityService, MemoryDirectory},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.backend,
        feed_window = config.feed_window,
        admins = config.admin_uids.len(),
        "Starting Alia chat API"
    );

    let (db, identity) = match config.backend {
        BackendKind::Firestore => {
            let db = FirestoreDb::new(&config.gcp_project_id).await?;

            let api_key = config
                .firebase_api_key
                .clone()
                .ok_or(ConfigError::Missing("FIREBASE_API_KEY"))?;
            let client = match std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
                Ok(host) => {
                    tracing::info!(host = %host, "Using Firebase Auth emulator");
                    FirebaseAuthClient::with_base_url(
                        api_key,
                        config.frontend_url.clone(),
                        format!("http://{}/identitytoolkit.googleapis.com/v1", host),
                    )?
                }
                Err(_) => FirebaseAuthClient::new(api_key, config.frontend_url.clone())?,
            };

            (ChatDb::firestore(db), IdentityService::firebase(client))
        }
        BackendKind::Memory => {
            tracing::warn!("Using in-memory backend; data is lost on restart");
            (
                ChatDb::memory(Arc::new(MemoryStore::new())),
                IdentityService::memory(Arc::new(MemoryDirectory::new())),
            )
        }
    };

    // Build shared state
    let state = Arc::new(AppState::new(config.clone(), db, identity));
    alia_chat::spawn_session_sweeper(state.clone());

    // Build router
    let app = alia_chat::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("alia_chat=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();

    Ok(())
}
