// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod identity;
pub mod message;
pub mod profile;

pub use identity::{AuthProvider, Identity};
pub use message::{FeedView, Message, MAX_MESSAGE_CHARS};
pub use profile::{Profile, ProfileDoc, ProfileUpdate, DEFAULT_DISPLAY_NAME};
