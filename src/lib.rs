// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Alia chat: a single shared real-time chat room.
//!
//! This crate provides the backend for a browser chat client: sign-in
//! through an identity provider, a live message feed rendered with
//! author profiles, and message posting.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::ChatDb;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use services::{AuthorizationPolicy, IdentityService, SessionRegistry};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub identity: IdentityService,
    pub sessions: SessionRegistry,
    pub policy: AuthorizationPolicy,
}

impl AppState {
    pub fn new(config: Config, db: ChatDb, identity: IdentityService) -> Self {
        Self {
            sessions: SessionRegistry::new(db.clone(), config.feed_window),
            policy: AuthorizationPolicy::new(config.admin_uids.iter().cloned()),
            config,
            identity,
        }
    }
}

/// Periodically close sessions idle for longer than the configured limit.
pub fn spawn_session_sweeper(state: Arc<AppState>) -> JoinHandle<()> {
    let max_idle = Duration::from_secs(state.config.session_idle_secs);
    let period = max_idle.min(Duration::from_secs(60));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            state.sessions.evict_idle(max_idle).await;
        }
    })
}
