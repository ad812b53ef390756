// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated identity as reported by the identity provider.

use serde::{Deserialize, Serialize};

/// Sign-in provider of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthProvider {
    Google,
    GitHub,
    Microsoft,
    Password,
    Unknown,
}

impl AuthProvider {
    /// Parse a provider id such as `google.com` or `password`.
    pub fn from_provider_id(provider_id: &str) -> Self {
        match provider_id {
            "google.com" => AuthProvider::Google,
            "github.com" => AuthProvider::GitHub,
            "microsoft.com" => AuthProvider::Microsoft,
            "password" => AuthProvider::Password,
            _ => AuthProvider::Unknown,
        }
    }

    /// Provider id as understood by the identity service.
    pub fn provider_id(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google.com",
            AuthProvider::GitHub => "github.com",
            AuthProvider::Microsoft => "microsoft.com",
            AuthProvider::Password => "password",
            AuthProvider::Unknown => "unknown",
        }
    }

    /// Human-readable label shown next to the user name.
    pub fn label(&self) -> &'static str {
        match self {
            AuthProvider::Google => "Google",
            AuthProvider::GitHub => "GitHub",
            AuthProvider::Microsoft => "Microsoft",
            AuthProvider::Password => "Email",
            AuthProvider::Unknown => "Unknown",
        }
    }
}

/// The currently signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub provider: AuthProvider,
}
