//! Role checks and the rules constraining role changes.

use anyhow::Result;
use sqlx::PgPool;

use crate::catraca::store::{self, Role, User};

/// Substring that marks an email as belonging to the institution.
pub const INSTITUTIONAL_MARKER: &str = "unb";

#[must_use]
pub fn is_institutional(email: &str) -> bool {
    email.contains(INSTITUTIONAL_MARKER)
}

/// Binary self-service toggle: USER becomes ADMIN, anything else becomes
/// USER. The toggle can never produce COADMIN.
#[must_use]
pub fn toggled(role: Role) -> Role {
    match role {
        Role::User => Role::Admin,
        Role::Admin | Role::Coadmin => Role::User,
    }
}

/// Privileged roles are reserved for institutional emails; demotion to USER
/// is always allowed.
#[must_use]
pub fn promotion_allowed(new_role: Role, target_email: &str) -> bool {
    match new_role {
        Role::Admin | Role::Coadmin => is_institutional(target_email),
        Role::User => true,
    }
}

/// Outcome of an authorization check against the caller's current role.
#[derive(Debug)]
pub enum RoleCheck {
    Granted(User),
    Denied,
}

/// Check the caller's role against an allowed set.
///
/// The role is re-read from the store on every call so revoked privileges
/// take effect on the next request, even while old tokens are still valid.
pub async fn require_role(
    pool: &PgPool,
    caller_email: &str,
    allowed: &[Role],
) -> Result<RoleCheck> {
    let Some(caller) = store::get_user_by_email(pool, caller_email).await? else {
        return Ok(RoleCheck::Denied);
    };

    if allowed.contains(&caller.role) {
        Ok(RoleCheck::Granted(caller))
    } else {
        Ok(RoleCheck::Denied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn institutional_marker_is_substring() {
        assert!(is_institutional("someone@unb.br"));
        assert!(is_institutional("unbeatable@email.com"));
        assert!(!is_institutional("someone@email.com"));
    }

    #[test]
    fn toggle_flips_user_and_admin() {
        assert_eq!(toggled(Role::User), Role::Admin);
        assert_eq!(toggled(Role::Admin), Role::User);
    }

    #[test]
    fn toggle_never_yields_coadmin() {
        for role in [Role::User, Role::Admin, Role::Coadmin] {
            assert_ne!(toggled(role), Role::Coadmin);
        }
    }

    #[test]
    fn privileged_promotion_requires_institutional_email() {
        assert!(promotion_allowed(Role::Admin, "a@unb.br"));
        assert!(promotion_allowed(Role::Coadmin, "a@unb.br"));
        assert!(!promotion_allowed(Role::Admin, "a@email.com"));
        assert!(!promotion_allowed(Role::Coadmin, "a@email.com"));
    }

    #[test]
    fn demotion_is_unconstrained() {
        assert!(promotion_allowed(Role::User, "a@email.com"));
        assert!(promotion_allowed(Role::User, "a@unb.br"));
    }
}
