// crates/permission-gate-core/src/core/role.rs
// ============================================================================
// Module: Roles and Role Defaults
// Description: Organization roles and the tier-four fallback table.
// Purpose: Answer requests no explicit rule covers, based on the actor's role.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Role defaults are a static table consulted after explicit rules. Entries
//! marked [`Ownership::Own`] only apply when the actor is acting on their own
//! resources (the request names the actor as owner). When several entries
//! match, a denying entry wins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::OrganizationId;
use crate::core::identifiers::UserId;
use crate::core::rule::ActionKind;
use crate::core::rule::ResourceKind;
use crate::core::rule::label_enum;
use crate::core::validation::ValidationError;

// ============================================================================
// SECTION: Roles
// ============================================================================

/// Organization role of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Full administrative standing.
    Admin,
    /// May create and modify own resources.
    Editor,
    /// Read-only.
    Viewer,
}

label_enum!(Role, "role", {
    Admin => "admin",
    Editor => "editor",
    Viewer => "viewer",
});

/// Whose resources a role default applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ownership {
    /// Only when the actor owns the target resource.
    Own,
    /// Regardless of owner.
    Any,
}

/// Identity attributes resolved for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// The user being described.
    pub user_id: UserId,
    /// Organization role, if any.
    pub role: Option<Role>,
    /// Organization the user belongs to.
    pub organization: Option<OrganizationId>,
    /// Organizations the user owns.
    #[serde(default)]
    pub owned_organizations: BTreeSet<OrganizationId>,
}

impl IdentityProfile {
    /// Returns true when the profile carries the admin role.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Some(Role::Admin)
    }

    /// Returns true when this user owns the organization `other` belongs to.
    #[must_use]
    pub fn owns_organization_of(&self, other: &Self) -> bool {
        other.organization.is_some_and(|org| self.owned_organizations.contains(&org))
    }
}

// ============================================================================
// SECTION: Role Defaults
// ============================================================================

/// One row of the role default table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefault {
    /// Role this entry applies to.
    pub role: Role,
    /// Resource classes covered.
    pub resources: BTreeSet<ResourceKind>,
    /// Actions covered; `all` covers every action.
    pub actions: BTreeSet<ActionKind>,
    /// Outcome when the entry matches.
    pub allowed: bool,
    /// Ownership requirement.
    pub ownership: Ownership,
}

impl RoleDefault {
    /// Returns true when the entry governs the request shape.
    fn matches(
        &self,
        role: Role,
        resource: ResourceKind,
        action: ActionKind,
        acting_on_own: bool,
    ) -> bool {
        self.role == role
            && self.resources.contains(&resource)
            && self.actions.iter().any(|entry| entry.covers(action))
            && (self.ownership == Ownership::Any || acting_on_own)
    }
}

/// Ordered role default table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefaults {
    /// Entries in declaration order.
    entries: Vec<RoleDefault>,
}

impl RoleDefaults {
    /// Builds a table from explicit entries.
    #[must_use]
    pub const fn new(entries: Vec<RoleDefault>) -> Self {
        Self {
            entries,
        }
    }

    /// Platform table: admins may do anything to their own resources,
    /// editors may view, create, and modify their own, viewers may view their own.
    #[must_use]
    pub fn platform() -> Self {
        let every_resource: BTreeSet<ResourceKind> = ResourceKind::ALL.into_iter().collect();
        let entry = |role, actions: &[ActionKind]| RoleDefault {
            role,
            resources: every_resource.clone(),
            actions: actions.iter().copied().collect(),
            allowed: true,
            ownership: Ownership::Own,
        };
        Self::new(vec![
            entry(Role::Admin, &[ActionKind::All]),
            entry(Role::Editor, &[ActionKind::View, ActionKind::Create, ActionKind::Modify]),
            entry(Role::Viewer, &[ActionKind::View]),
        ])
    }

    /// Returns the entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[RoleDefault] {
        &self.entries
    }

    /// Looks up the outcome for a role; denying entries win over allowing ones.
    #[must_use]
    pub fn lookup(
        &self,
        role: Role,
        resource: ResourceKind,
        action: ActionKind,
        acting_on_own: bool,
    ) -> Option<bool> {
        let mut outcome = None;
        for entry in &self.entries {
            if !entry.matches(role, resource, action, acting_on_own) {
                continue;
            }
            if !entry.allowed {
                return Some(false);
            }
            outcome = Some(true);
        }
        outcome
    }
}

impl FromStr for Ownership {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "own" => Ok(Self::Own),
            "any" => Ok(Self::Any),
            _ => Err(ValidationError::UnknownValue {
                field: "ownership",
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Own => f.write_str("own"),
            Self::Any => f.write_str("any"),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::Ownership;
    use super::Role;
    use super::RoleDefault;
    use super::RoleDefaults;
    use crate::core::rule::ActionKind;
    use crate::core::rule::ResourceKind;

    #[test]
    fn platform_defaults_only_cover_own_resources() {
        let table = RoleDefaults::platform();
        assert_eq!(table.lookup(Role::Viewer, ResourceKind::Orders, ActionKind::View, true), Some(true));
        assert_eq!(table.lookup(Role::Viewer, ResourceKind::Orders, ActionKind::View, false), None);
        assert_eq!(table.lookup(Role::Viewer, ResourceKind::Orders, ActionKind::Exit, true), None);
        assert_eq!(table.lookup(Role::Admin, ResourceKind::Margins, ActionKind::Exit, true), Some(true));
    }

    #[test]
    fn denying_entry_wins() {
        let mut table = RoleDefaults::platform().entries().to_vec();
        table.push(RoleDefault {
            role: Role::Editor,
            resources: BTreeSet::from([ResourceKind::Strategies]),
            actions: BTreeSet::from([ActionKind::Modify]),
            allowed: false,
            ownership: Ownership::Any,
        });
        let table = RoleDefaults::new(table);
        assert_eq!(
            table.lookup(Role::Editor, ResourceKind::Strategies, ActionKind::Modify, true),
            Some(false)
        );
        assert_eq!(
            table.lookup(Role::Editor, ResourceKind::Positions, ActionKind::Modify, true),
            Some(true)
        );
    }
}
