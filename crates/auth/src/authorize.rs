use std::collections::BTreeSet;

use serde::Serialize;
use thiserror::Error;

use crate::{Identity, Permission, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(Permission),

    #[error("forbidden: role '{0}' is not elevated")]
    RoleRequired(Role),
}

/// Access policy applied to `Protected` routes.
///
/// Precedence is the same everywhere:
/// - an explicit route permission is checked against the identity's
///   effective permissions (its own grants, plus `*` for elevated roles);
/// - without an explicit permission the route is gated on an elevated role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPolicy {
    elevated_roles: Vec<Role>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::new([Role::new("admin")])
    }
}

impl AccessPolicy {
    pub fn new<I>(elevated_roles: I) -> Self
    where
        I: IntoIterator<Item = Role>,
    {
        Self {
            elevated_roles: elevated_roles.into_iter().collect(),
        }
    }

    pub fn elevated_roles(&self) -> &[Role] {
        &self.elevated_roles
    }

    pub fn is_elevated(&self, role: &Role) -> bool {
        self.elevated_roles.iter().any(|r| r.matches(role))
    }

    /// Permissions the identity effectively holds under this policy.
    pub fn effective_permissions(&self, identity: &Identity) -> Vec<Permission> {
        // Convention: elevated roles hold the wildcard.
        let mut perms = identity.permissions.clone();
        if self.is_elevated(&identity.role) && !perms.iter().any(Permission::is_wildcard) {
            perms.push(Permission::WILDCARD);
        }
        perms
    }

    /// Authorize an identity for a `Protected` route.
    ///
    /// - No IO
    /// - No panics
    pub fn authorize(
        &self,
        identity: &Identity,
        permission: Option<&Permission>,
    ) -> Result<(), AuthzError> {
        match permission {
            Some(required) => {
                if self
                    .effective_permissions(identity)
                    .iter()
                    .any(|p| p.grants(required))
                {
                    Ok(())
                } else {
                    Err(AuthzError::Forbidden(required.clone()))
                }
            }
            None => {
                if self.is_elevated(&identity.role) {
                    Ok(())
                } else {
                    Err(AuthzError::RoleRequired(identity.role.clone()))
                }
            }
        }
    }

    /// Describe why `authorize` decided the way it did (for logs and audit).
    pub fn explain(
        &self,
        identity: &Identity,
        permission: Option<&Permission>,
    ) -> AuthorizationExplanation {
        let effective: BTreeSet<String> = self
            .effective_permissions(identity)
            .iter()
            .map(|p| p.as_str().to_string())
            .collect();
        let outcome = self.authorize(identity, permission);

        let reason = match (&outcome, permission) {
            (Ok(()), Some(p)) if effective.contains("*") => {
                format!("wildcard permission covers '{p}'")
            }
            (Ok(()), Some(p)) => format!("explicit permission '{p}'"),
            (Ok(()), None) => format!("role '{}' is elevated", identity.role),
            (Err(e), _) => e.to_string(),
        };

        AuthorizationExplanation {
            subject: identity.subject.to_string(),
            role: identity.role.as_str().to_string(),
            required_permission: permission.map(|p| p.as_str().to_string()),
            granted: outcome.is_ok(),
            reason,
            effective_permissions: effective.into_iter().collect(),
        }
    }
}

/// Outcome of an authorization decision with the inputs that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub subject: String,
    pub role: String,
    pub required_permission: Option<String>,
    pub granted: bool,
    pub reason: String,
    pub effective_permissions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SubjectId;

    fn identity(role: &'static str, perms: &[&'static str]) -> Identity {
        Identity::new(SubjectId::new(), Role::new(role))
            .with_permissions(perms.iter().map(|p| Permission::new(*p)))
    }

    #[test]
    fn explicit_permission_is_checked_first() {
        let policy = AccessPolicy::default();
        let editor = identity("editor", &["users.write"]);

        assert_eq!(
            policy.authorize(&editor, Some(&Permission::new("users.write"))),
            Ok(())
        );
        assert_eq!(
            policy.authorize(&editor, Some(&Permission::new("roles.write"))),
            Err(AuthzError::Forbidden(Permission::new("roles.write")))
        );
    }

    #[test]
    fn elevated_role_holds_wildcard() {
        let policy = AccessPolicy::default();
        let admin = identity("Admin", &[]);

        assert_eq!(
            policy.authorize(&admin, Some(&Permission::new("roles.write"))),
            Ok(())
        );
        assert!(policy
            .effective_permissions(&admin)
            .contains(&Permission::WILDCARD));
    }

    #[test]
    fn granted_wildcard_covers_any_permission() {
        let policy = AccessPolicy::default();
        let operator = identity("operator", &["*"]);

        assert_eq!(
            policy.authorize(&operator, Some(&Permission::new("anything.at.all"))),
            Ok(())
        );
        assert_eq!(
            policy.effective_permissions(&operator),
            vec![Permission::WILDCARD]
        );
    }

    #[test]
    fn missing_permission_degrades_to_role_gate() {
        let policy = AccessPolicy::new([Role::new("admin"), Role::new("owner")]);

        assert_eq!(policy.authorize(&identity("owner", &[]), None), Ok(()));
        // Fine-grained grants do not satisfy the role gate.
        assert_eq!(
            policy.authorize(&identity("editor", &["*"]), None),
            Err(AuthzError::RoleRequired(Role::new("editor")))
        );
    }

    #[test]
    fn explanation_reports_denial() {
        let policy = AccessPolicy::default();
        let viewer = identity("viewer", &["users.read"]);
        let required = Permission::new("users.write");

        let explanation = policy.explain(&viewer, Some(&required));
        assert!(!explanation.granted);
        assert_eq!(
            explanation.required_permission.as_deref(),
            Some("users.write")
        );
        assert_eq!(
            explanation.effective_permissions,
            vec!["users.read".to_string()]
        );
        assert!(explanation.reason.contains("users.write"));
    }
}
