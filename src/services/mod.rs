// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod feed;
pub mod identity;
pub mod messages;
pub mod notify;
pub mod policy;
pub mod profiles;
pub mod session;

pub use feed::{FeedSubscription, FeedSynchronizer};
pub use identity::{FirebaseAuthClient, IdentityService, MemoryDirectory, OAuthCredential, SignInMethod};
pub use messages::MessageService;
pub use notify::NotificationTracker;
pub use policy::AuthorizationPolicy;
pub use profiles::ProfileResolver;
pub use session::{ChatSession, FeedEntry, RenderedFeed, SessionRegistry, SignInOutcome};
