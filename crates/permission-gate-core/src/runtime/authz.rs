// crates/permission-gate-core/src/runtime/authz.rs
// ============================================================================
// Module: Mutation Authorization
// Description: Standing checks for who may grant, restrict, and revoke.
// Purpose: Provide a pluggable, fail-closed authorization seam for writes.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! Mutation authorization hooks for the permission service.

use std::sync::Arc;

use crate::core::IdentityProfile;
use crate::core::UserId;
use crate::interfaces::IdentityResolver;

/// Mutation being authorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    /// Write rules on behalf of `grantor`.
    Grant {
        /// Owner of the granted resources.
        grantor: UserId,
    },
    /// Impose restrictions on `target`.
    Restrict {
        /// User being restricted.
        target: UserId,
    },
    /// Revoke a rule written for `grantor`.
    RevokeRule {
        /// Owner of the rule.
        grantor: UserId,
    },
    /// Revoke a restriction imposed by `imposed_by` on `target`.
    RevokeRestriction {
        /// Original imposer.
        imposed_by: UserId,
        /// Restricted user.
        target: UserId,
    },
}

/// Mutation authorization decision outcome.
#[derive(Debug, Clone)]
pub struct AuthzDecision {
    /// Whether the mutation is allowed.
    pub allowed: bool,
    /// Reason label for audit logs.
    pub reason: String,
}

impl AuthzDecision {
    /// Builds an allow decision.
    fn allow(reason: &str) -> Self {
        Self {
            allowed: true,
            reason: reason.to_string(),
        }
    }

    /// Builds a deny decision.
    fn deny(reason: &str) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
        }
    }
}

/// Mutation authorization interface.
pub trait MutationAuthorizer: Send + Sync {
    /// Authorizes `caller` to perform `action`.
    fn authorize(&self, caller: UserId, action: MutationAction) -> AuthzDecision;
}

/// No-op authorizer that always allows.
pub struct NoopMutationAuthorizer;

impl MutationAuthorizer for NoopMutationAuthorizer {
    fn authorize(&self, _caller: UserId, _action: MutationAction) -> AuthzDecision {
        AuthzDecision::allow("noop_allow")
    }
}

/// Standing rules derived from identity profiles.
///
/// Grants and rule revocations require being the grantor or an admin.
/// Restrictions require being the target, an admin, or the owner of the
/// target's organization; revoking one requires being its imposer, an
/// admin, or that organization owner. Identity failures deny.
pub struct StandingAuthorizer {
    /// Identity backend.
    identities: Arc<dyn IdentityResolver>,
}

impl StandingAuthorizer {
    /// Creates an authorizer over `identities`.
    #[must_use]
    pub fn new(identities: Arc<dyn IdentityResolver>) -> Self {
        Self {
            identities,
        }
    }

    /// Resolves a profile, folding errors into `None`.
    fn profile(&self, user: UserId) -> Result<Option<IdentityProfile>, AuthzDecision> {
        self.identities.profile(user).map_err(|_| AuthzDecision::deny("identity_unavailable"))
    }

    /// Returns the decision for an action once the caller is not the direct party.
    fn admin_or_org_owner(
        &self,
        caller: Option<&IdentityProfile>,
        target: UserId,
    ) -> AuthzDecision {
        let Some(caller) = caller else {
            return AuthzDecision::deny("caller_unknown");
        };
        if caller.is_admin() {
            return AuthzDecision::allow("admin");
        }
        match self.profile(target) {
            Err(decision) => decision,
            Ok(Some(target)) if caller.owns_organization_of(&target) => {
                AuthzDecision::allow("organization_owner")
            }
            Ok(_) => AuthzDecision::deny("not_organization_owner"),
        }
    }
}

impl MutationAuthorizer for StandingAuthorizer {
    fn authorize(&self, caller: UserId, action: MutationAction) -> AuthzDecision {
        let profile = match self.profile(caller) {
            Ok(profile) => profile,
            Err(decision) => return decision,
        };
        let is_admin = profile.as_ref().is_some_and(IdentityProfile::is_admin);
        match action {
            MutationAction::Grant {
                grantor,
            }
            | MutationAction::RevokeRule {
                grantor,
            } => {
                if caller == grantor {
                    AuthzDecision::allow("grantor")
                } else if is_admin {
                    AuthzDecision::allow("admin")
                } else {
                    AuthzDecision::deny("not_grantor")
                }
            }
            MutationAction::Restrict {
                target,
            } => {
                if caller == target {
                    AuthzDecision::allow("self")
                } else {
                    self.admin_or_org_owner(profile.as_ref(), target)
                }
            }
            MutationAction::RevokeRestriction {
                imposed_by,
                target,
            } => {
                if caller == imposed_by {
                    AuthzDecision::allow("imposer")
                } else {
                    self.admin_or_org_owner(profile.as_ref(), target)
                }
            }
        }
    }
}
