// crates/permission-gate-core/src/runtime/identity.rs
// ============================================================================
// Module: Static Identity Directory
// Description: In-process identity resolver backed by a fixed profile map.
// Purpose: Resolve roles and organizations from configuration or tests.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`StaticIdentityDirectory`] answers [`IdentityResolver`] lookups from a
//! map built at startup. Unknown users resolve to `None`, which the
//! evaluator treats as "no role".

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::core::IdentityProfile;
use crate::core::UserId;
use crate::interfaces::IdentityError;
use crate::interfaces::IdentityResolver;

// ============================================================================
// SECTION: Directory
// ============================================================================

/// Fixed identity directory.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityDirectory {
    /// Profiles by user.
    profiles: BTreeMap<UserId, IdentityProfile>,
}

impl StaticIdentityDirectory {
    /// Builds a directory from profiles; later duplicates replace earlier ones.
    #[must_use]
    pub fn new(profiles: impl IntoIterator<Item = IdentityProfile>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|profile| (profile.user_id, profile)).collect(),
        }
    }

    /// Adds or replaces a profile.
    pub fn insert(&mut self, profile: IdentityProfile) {
        self.profiles.insert(profile.user_id, profile);
    }
}

impl IdentityResolver for StaticIdentityDirectory {
    fn profile(&self, user: UserId) -> Result<Option<IdentityProfile>, IdentityError> {
        Ok(self.profiles.get(&user).cloned())
    }
}
