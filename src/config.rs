// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Cloud Run injects secrets as environment variables via secret bindings,
//! so everything is read from the process environment (or a local `.env`).

use std::env;
use std::str::FromStr;

/// Default number of most-recent messages rendered per feed snapshot.
pub const DEFAULT_FEED_WINDOW: usize = 50;

/// Default time a session may go without requests or an open feed stream.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Which backend the chat components talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Firestore for messages/profiles, Firebase Identity Toolkit for sign-in.
    Firestore,
    /// Process-local store and account directory (local development).
    Memory,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(BackendKind::Firestore),
            "memory" => Ok(BackendKind::Memory),
            _ => Err(ConfigError::Invalid("CHAT_BACKEND", s.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL (CORS origin and OAuth request URI)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    /// Backend selection
    pub backend: BackendKind,
    /// Most-recent messages kept per rendered feed
    pub feed_window: usize,
    /// User ids allowed to edit other users' profiles
    pub admin_uids: Vec<String>,
    /// Idle sessions are closed after this many seconds
    pub session_idle_secs: u64,

    // --- Secrets ---
    /// Firebase Web API key (required for the Firestore backend)
    pub firebase_api_key: Option<String>,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
}

impl Config {
    /// Config for tests: in-memory backend and a fixed signing key.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            backend: BackendKind::Memory,
            feed_window: DEFAULT_FEED_WINDOW,
            admin_uids: Vec::new(),
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
            firebase_api_key: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let backend = match env::var("CHAT_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => BackendKind::Firestore,
        };

        let firebase_api_key = env::var("FIREBASE_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        if backend == BackendKind::Firestore && firebase_api_key.is_none() {
            return Err(ConfigError::Missing("FIREBASE_API_KEY"));
        }

        let feed_window = match env::var("FEED_WINDOW") {
            Ok(v) => parse_feed_window(&v)?,
            Err(_) => DEFAULT_FEED_WINDOW,
        };

        let session_idle_secs = match env::var("SESSION_IDLE_SECS") {
            Ok(v) => parse_session_idle(&v)?,
            Err(_) => DEFAULT_SESSION_IDLE_SECS,
        };

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),
            backend,
            feed_window,
            admin_uids: parse_uid_list(&env::var("ADMIN_UIDS").unwrap_or_default()),
            session_idle_secs,
            firebase_api_key,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
        })
    }

    /// Whether session cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

fn parse_feed_window(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid("FEED_WINDOW", raw.to_string())),
    }
}

fn parse_session_idle(raw: &str) -> Result<u64, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::Invalid("SESSION_IDLE_SECS", raw.to_string())),
    }
}

/// Parse a comma-separated uid list, skipping blanks.
fn parse_uid_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|uid| !uid.is_empty())
        .map(String::from)
        .collect()
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
