// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Who may edit which profile.

use std::collections::HashSet;

/// Profile edit permissions.
///
/// Every user may edit their own profile. Administrators, configured via
/// `ADMIN_UIDS`, may edit anyone's.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationPolicy {
    admin_uids: HashSet<String>,
}

impl AuthorizationPolicy {
    pub fn new<I, S>(admin_uids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            admin_uids: admin_uids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_admin(&self, uid: &str) -> bool {
        self.admin_uids.contains(uid)
    }

    pub fn can_edit_profile(&self, actor_uid: &str, target_uid: &str) -> bool {
        actor_uid == target_uid || self.is_admin(actor_uid)
    }
}
