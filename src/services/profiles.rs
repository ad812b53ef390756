// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile resolver with a per-session cache.
//!
//! Each chat session owns one resolver; signing out drops it together
//! with everything it cached. The cache is never authoritative:
//! - reads consult the cache, then the backend (at most once per user,
//!   even under concurrent lookups)
//! - writes go to the backend first and touch the cache only on success
//! - read failures degrade to the anonymous profile and are not cached

use crate::db::ChatDb;
use crate::error::Result;
use crate::models::{Identity, Profile, ProfileUpdate};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Resolves user ids to display profiles.
pub struct ProfileResolver {
    db: ChatDb,
    /// Resolved profiles for this session.
    cache: DashMap<String, Profile>,
    /// Per-user lock collapsing concurrent misses into a single read.
    inflight: DashMap<String, Arc<Mutex<()>>>,
}

impl ProfileResolver {
    pub fn new(db: ChatDb) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            inflight: DashMap::new(),
        }
    }

    /// Resolve a profile for rendering.
    ///
    /// Never fails: a backend error yields the anonymous profile.
    pub async fn resolve(&self, uid: &str) -> Profile {
        match self.try_resolve(uid).await {
            Ok(profile) => profile,
            Err(e) => {
                tracing::warn!(uid = %uid, error = %e, "Profile lookup failed, using default");
                Profile::anonymous(uid)
            }
        }
    }

    /// Resolve a profile, surfacing backend errors.
    pub async fn try_resolve(&self, uid: &str) -> Result<Profile> {
        Ok(self.load(uid).await?.0)
    }

    /// Resolve the signed-in user's own profile, creating it on first sign-in.
    ///
    /// A missing profile is seeded with the identity's photo (when it has
    /// one); the nickname is chosen separately.
    pub async fn resolve_or_create(&self, identity: &Identity) -> Result<Profile> {
        let (profile, existed) = self.load(&identity.uid).await?;
        if existed {
            return Ok(profile);
        }

        match &identity.photo_url {
            Some(photo) => {
                tracing::info!(uid = %identity.uid, "Creating profile on first sign-in");
                self.set_own_profile(&identity.uid, ProfileUpdate::AvatarUrl(photo.clone()))
                    .await
            }
            None => Ok(profile),
        }
    }

    /// Merge-write one field of the caller's profile, then update the cache.
    ///
    /// The caller's own profile is cached from sign-in on, so the write is
    /// applied to the cached entry with no round trip. On failure the cache
    /// is left as it was and the error propagates.
    pub async fn set_own_profile(&self, uid: &str, update: ProfileUpdate) -> Result<Profile> {
        self.db.merge_profile(uid, &update).await?;

        let mut entry = self
            .cache
            .entry(uid.to_string())
            .or_insert_with(|| Profile::anonymous(uid));
        entry.apply(&update);

        tracing::debug!(uid = %uid, field = update.field_name(), "Profile updated");
        Ok(entry.clone())
    }

    /// Merge-write one field of an arbitrary user's profile. Callers
    /// check [`AuthorizationPolicy`](crate::services::AuthorizationPolicy)
    /// first.
    ///
    /// Only a cached entry is patched in place. Otherwise the merged
    /// document is read back, since the fields not written are unknown.
    pub async fn set_profile(&self, uid: &str, update: ProfileUpdate) -> Result<Profile> {
        self.db.merge_profile(uid, &update).await?;
        tracing::debug!(uid = %uid, field = update.field_name(), "Profile updated");

        if let Some(mut entry) = self.cache.get_mut(uid) {
            entry.apply(&update);
            return Ok(entry.clone());
        }

        match self.try_resolve(uid).await {
            Ok(profile) => Ok(profile),
            Err(e) => {
                tracing::warn!(uid = %uid, error = %e, "Read-back after profile write failed");
                let mut profile = Profile::anonymous(uid);
                profile.apply(&update);
                Ok(profile)
            }
        }
    }

    /// Cached profile, if any (no backend access).
    pub fn cached(&self, uid: &str) -> Option<Profile> {
        self.cache.get(uid).map(|p| p.clone())
    }

    /// Number of cached profiles.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.cache.clear();
        self.inflight.clear();
    }

    /// Cache-first load. The flag reports whether a stored record exists
    /// (always `true` for cache hits).
    async fn load(&self, uid: &str) -> Result<(Profile, bool)> {
        // Fast path, no I/O
        if let Some(profile) = self.cached(uid) {
            return Ok((profile, true));
        }

        let lock = self
            .inflight
            .entry(uid.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another task may have filled the cache while we waited
        if let Some(profile) = self.cached(uid) {
            return Ok((profile, true));
        }

        let doc = self.db.get_profile(uid).await?;
        let existed = doc.is_some();
        let profile = match doc {
            Some(doc) => Profile::from_doc(uid, doc),
            None => Profile::anonymous(uid),
        };

        self.cache.insert(uid.to_string(), profile.clone());
        Ok((profile, existed))
    }
}
