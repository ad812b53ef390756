// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User profile model (display name and avatar, separate from identity).

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Identity;

/// Display name used when a profile has no nickname.
pub const DEFAULT_DISPLAY_NAME: &str = "Anon";

/// Resolved profile as seen by the rest of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub notifications_enabled: bool,
}

impl Profile {
    /// Default profile for a user with no stored record.
    pub fn anonymous(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: DEFAULT_DISPLAY_NAME.to_string(),
            avatar_url: None,
            notifications_enabled: false,
        }
    }

    /// Build from the stored document.
    pub fn from_doc(user_id: &str, doc: ProfileDoc) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: doc
                .nickname
                .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()),
            avatar_url: doc.photo_url,
            notifications_enabled: doc.notifications_enabled.unwrap_or(false),
        }
    }

    /// Whether the owner still has to pick a nickname.
    pub fn needs_nickname(&self) -> bool {
        let name = self.display_name.trim();
        name.is_empty() || name == DEFAULT_DISPLAY_NAME
    }

    /// Apply a single-field update in place.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        match update {
            ProfileUpdate::Nickname(name) => self.display_name = name.clone(),
            ProfileUpdate::AvatarUrl(url) => self.avatar_url = Some(url.clone()),
            ProfileUpdate::NotificationsEnabled(on) => self.notifications_enabled = *on,
        }
    }
}

/// Stored profile document (`users/{uid}`), merge-written one field at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_enabled: Option<bool>,
}

impl ProfileDoc {
    /// Document carrying only the updated field.
    pub fn from_update(update: &ProfileUpdate) -> Self {
        let mut doc = Self::default();
        doc.merge(update);
        doc
    }

    /// Merge a single field, leaving the others untouched.
    pub fn merge(&mut self, update: &ProfileUpdate) {
        match update {
            ProfileUpdate::Nickname(name) => self.nickname = Some(name.clone()),
            ProfileUpdate::AvatarUrl(url) => self.photo_url = Some(url.clone()),
            ProfileUpdate::NotificationsEnabled(on) => self.notifications_enabled = Some(*on),
        }
    }
}

/// A write to one profile field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileUpdate {
    Nickname(String),
    AvatarUrl(String),
    NotificationsEnabled(bool),
}

impl ProfileUpdate {
    /// Stored field name (update mask path).
    pub fn field_name(&self) -> &'static str {
        match self {
            ProfileUpdate::Nickname(_) => "nickname",
            ProfileUpdate::AvatarUrl(_) => "photo_url",
            ProfileUpdate::NotificationsEnabled(_) => "notifications_enabled",
        }
    }
}

/// Pick the nickname to persist after prompting the user.
///
/// A non-blank answer is used trimmed. Otherwise the first word of the
/// identity's display name (or email) is used, and failing that the
/// default display name.
pub fn choose_nickname(answer: Option<&str>, identity: &Identity) -> String {
    if let Some(answer) = answer.map(str::trim).filter(|a| !a.is_empty()) {
        return answer.to_string();
    }

    identity
        .display_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .or(identity.email.as_deref())
        .and_then(|source| source.split_whitespace().next())
        .map(String::from)
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}
