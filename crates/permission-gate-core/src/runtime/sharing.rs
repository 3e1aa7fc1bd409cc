// crates/permission-gate-core/src/runtime/sharing.rs
// ============================================================================
// Module: Sharing Summaries
// Description: Per-resource views of a grantor's data-sharing rules.
// Purpose: Answer "who can see my data" without issuing one evaluation per user.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Summaries fold a grantor's active data-sharing rules into a
//! [`SharingSettings`] per resource. A [`ViewerSet`] applies the same
//! deny-over-allow precedence as evaluation: an excluded user never views,
//! even under an everyone grant. Restrictions and role defaults are not
//! consulted here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::Grantee;
use crate::core::PermissionLevel;
use crate::core::PermissionRule;
use crate::core::ResourceKind;
use crate::core::UserId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Sharing state for one resource class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingSettings {
    /// An allow-everyone rule is active.
    pub shared_with_everyone: bool,
    /// A deny-everyone rule is active.
    pub denied_to_everyone: bool,
    /// Users named by allow rules.
    pub allowed: BTreeSet<UserId>,
    /// Users named by deny rules.
    pub excluded: BTreeSet<UserId>,
}

/// Resolved audience of one resource class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerSet {
    /// Owner of the data.
    pub grantor: UserId,
    /// Resource class.
    pub resource: ResourceKind,
    /// Everyone not excluded may view.
    pub everyone: bool,
    /// Users explicitly allowed (excluded users removed).
    pub allowed: BTreeSet<UserId>,
    /// Users explicitly excluded.
    pub excluded: BTreeSet<UserId>,
}

impl ViewerSet {
    /// Builds a viewer set from a resource's settings.
    #[must_use]
    pub fn from_settings(
        grantor: UserId,
        resource: ResourceKind,
        settings: &SharingSettings,
    ) -> Self {
        let everyone = settings.shared_with_everyone && !settings.denied_to_everyone;
        let allowed = if settings.denied_to_everyone {
            BTreeSet::new()
        } else {
            settings.allowed.difference(&settings.excluded).copied().collect()
        };
        Self {
            grantor,
            resource,
            everyone,
            allowed,
            excluded: settings.excluded.clone(),
        }
    }

    /// Returns true when `user` may view under the grantor's rules.
    #[must_use]
    pub fn can_view(&self, user: UserId) -> bool {
        !self.excluded.contains(&user) && (self.everyone || self.allowed.contains(&user))
    }

    /// Resolves the concrete viewers among `universe`, excluding the grantor.
    #[must_use]
    pub fn resolve(&self, universe: impl IntoIterator<Item = UserId>) -> BTreeSet<UserId> {
        universe.into_iter().filter(|user| *user != self.grantor && self.can_view(*user)).collect()
    }
}

// ============================================================================
// SECTION: Folding
// ============================================================================

/// Folds active data-sharing rules into per-resource settings.
#[must_use]
pub fn summarize_sharing<'a>(
    rules: impl IntoIterator<Item = &'a PermissionRule>,
) -> BTreeMap<ResourceKind, SharingSettings> {
    let mut summary: BTreeMap<ResourceKind, SharingSettings> = BTreeMap::new();
    for rule in rules {
        let settings = summary.entry(rule.resource).or_default();
        match (rule.level, rule.grantee) {
            (PermissionLevel::Allow, Grantee::Everyone) => settings.shared_with_everyone = true,
            (PermissionLevel::Deny, Grantee::Everyone) => settings.denied_to_everyone = true,
            (PermissionLevel::Allow, Grantee::User(user)) => {
                settings.allowed.insert(user);
            }
            (PermissionLevel::Deny, Grantee::User(user)) => {
                settings.excluded.insert(user);
            }
        }
    }
    summary
}
