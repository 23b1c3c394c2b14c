use std::sync::Arc;
use tracing::warn;
use crate::auth::claims::ClaimsAuthenticationService;
use crate::auth::principal::Principal;
use crate::core::error::{Error, Result};
use crate::security::identity::{IdentityScope, PermissionScope, SecurityIdentity};
use crate::security::permissions::SecurityPermissions;
use crate::security::secure_database::SecureDatabase;

/// How access decisions are made, chosen from `Config::enable_authentication`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationMode {
    /// Decisions follow the ACLs.
    Enforced,
    /// Every validation passes. Each pass that the ACLs would have denied is
    /// logged on the `arriba::audit` target.
    GrantAll,
}

/// Access checks against a `SecureDatabase`.
pub struct Authorizer {
    database: Arc<SecureDatabase>,
    claims: Arc<ClaimsAuthenticationService>,
    mode: AuthorizationMode,
}

impl Authorizer {
    pub fn new(database: Arc<SecureDatabase>, claims: Arc<ClaimsAuthenticationService>) -> Self {
        let mode = if database.config().enable_authentication {
            AuthorizationMode::Enforced
        } else {
            AuthorizationMode::GrantAll
        };
        Self::with_mode(database, claims, mode)
    }

    pub fn with_mode(database: Arc<SecureDatabase>, claims: Arc<ClaimsAuthenticationService>, mode: AuthorizationMode) -> Self {
        Authorizer { database, claims, mode }
    }

    pub fn mode(&self) -> AuthorizationMode {
        self.mode
    }

    /// ACL decision for `table` ("" for the database). A table with no grants
    /// at all is open to everyone.
    pub fn has_table_access(&self, table: &str, user: &dyn Principal, scope: PermissionScope) -> bool {
        let security = self.database.security(table);
        if !security.has_table_access_security() {
            return true;
        }
        self.has_permission(&security, user, scope)
    }

    pub fn has_permission(&self, security: &SecurityPermissions, user: &dyn Principal, scope: PermissionScope) -> bool {
        if !user.is_authenticated() || user.name().is_empty() {
            return false;
        }

        // Direct grant first; group lookups cost a claims check each
        if security.is_identity_in_permission_scope(IdentityScope::User, user.name(), scope) {
            return true;
        }
        security
            .get_scope_identities(scope, IdentityScope::Group)
            .any(|group| self.claims.is_user_in_group(user, &group.name).unwrap_or(false))
    }

    pub fn is_in_identity(&self, user: &dyn Principal, identity: &SecurityIdentity) -> bool {
        let member = match identity.scope {
            IdentityScope::User => user.is_authenticated() && identity.name.eq_ignore_ascii_case(user.name()),
            IdentityScope::Group => self.claims.is_user_in_group(user, &identity.name).unwrap_or(false),
        };
        self.grant_override(member, user, "identity", &identity.to_string())
    }

    /// Fails with `TableNotFound` before any permission is considered.
    pub fn validate_table_access(&self, table: &str, user: &dyn Principal, scope: PermissionScope) -> Result<bool> {
        if !self.database.table_exists(table) {
            return Err(Error::table_not_found(table));
        }
        let granted = self.has_table_access(table, user, scope);
        Ok(self.grant_override(granted, user, &scope.to_string(), table))
    }

    pub fn validate_database_access(&self, user: &dyn Principal, scope: PermissionScope) -> bool {
        let granted = self.has_table_access("", user, scope);
        self.grant_override(granted, user, &scope.to_string(), "database")
    }

    /// Creating tables needs Writer on a database ACL that exists; with no
    /// database ACL nobody may create.
    pub fn validate_create_access(&self, user: &dyn Principal) -> bool {
        let security = self.database.database_permissions();
        let granted = security.has_table_access_security() && self.has_permission(&security, user, PermissionScope::Writer);
        self.grant_override(granted, user, "create", "database")
    }

    fn grant_override(&self, granted: bool, user: &dyn Principal, permission: &str, target: &str) -> bool {
        match self.mode {
            AuthorizationMode::Enforced => granted,
            AuthorizationMode::GrantAll => {
                if !granted {
                    warn!(
                        target: "arriba::audit",
                        user = %user.name(),
                        permission = %permission,
                        target_name = %target,
                        "permission granted because authentication is disabled"
                    );
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::ClaimsPrincipal;
    use crate::core::config::Config;
    use crate::core::error::ErrorKind;

    fn setup(dir: &std::path::Path, mode: AuthorizationMode) -> Authorizer {
        let database = Arc::new(SecureDatabase::open(Config::with_storage_path(dir)).unwrap());
        database.add_table("Bugs", None).unwrap();
        database.add_table("Open", None).unwrap();
        database.update_security("Bugs", |s| {
            s.grant(IdentityScope::User, "scott", PermissionScope::Reader);
            s.grant(IdentityScope::Group, "bug-writers", PermissionScope::Writer);
        });
        Authorizer::with_mode(database, Arc::new(ClaimsAuthenticationService::default()), mode)
    }

    #[test]
    fn unsecured_tables_are_open_to_everyone() {
        let dir = tempfile::tempdir().unwrap();
        let auth = setup(dir.path(), AuthorizationMode::Enforced);
        let anonymous = ClaimsPrincipal::anonymous();
        for scope in [PermissionScope::Reader, PermissionScope::Writer, PermissionScope::Owner] {
            assert!(auth.validate_table_access("Open", &anonymous, scope).unwrap());
        }
    }

    #[test]
    fn scopes_are_checked_independently() {
        let dir = tempfile::tempdir().unwrap();
        let auth = setup(dir.path(), AuthorizationMode::Enforced);
        let scott = ClaimsPrincipal::authenticated("Scott", Vec::<String>::new());
        let writer = ClaimsPrincipal::authenticated("ericmai", ["bug-writers"]);

        assert!(auth.validate_table_access("Bugs", &scott, PermissionScope::Reader).unwrap());
        assert!(!auth.validate_table_access("Bugs", &scott, PermissionScope::Writer).unwrap());
        assert!(auth.validate_table_access("Bugs", &writer, PermissionScope::Writer).unwrap());
        assert!(!auth.validate_table_access("Bugs", &writer, PermissionScope::Reader).unwrap());
        assert!(!auth.validate_table_access("Bugs", &ClaimsPrincipal::anonymous(), PermissionScope::Reader).unwrap());
    }

    #[test]
    fn missing_table_is_reported_before_access() {
        let dir = tempfile::tempdir().unwrap();
        let auth = setup(dir.path(), AuthorizationMode::Enforced);
        let err = auth
            .validate_table_access("Nope", &ClaimsPrincipal::anonymous(), PermissionScope::Reader)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::TableNotFound);
    }

    #[test]
    fn create_requires_database_acl() {
        let dir = tempfile::tempdir().unwrap();
        let auth = setup(dir.path(), AuthorizationMode::Enforced);
        let admin = ClaimsPrincipal::authenticated("admin", Vec::<String>::new());
        assert!(!auth.validate_create_access(&admin));

        auth.database.update_security("", |s| s.grant(IdentityScope::User, "admin", PermissionScope::Writer));
        assert!(auth.validate_create_access(&admin));
        assert!(!auth.validate_create_access(&ClaimsPrincipal::authenticated("scott", Vec::<String>::new())));
    }

    #[test]
    fn grant_all_passes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let auth = setup(dir.path(), AuthorizationMode::GrantAll);
        let anonymous = ClaimsPrincipal::anonymous();
        assert!(auth.validate_table_access("Bugs", &anonymous, PermissionScope::Owner).unwrap());
        assert!(auth.validate_create_access(&anonymous));
        assert!(auth.is_in_identity(&anonymous, &SecurityIdentity::group("hr")));
        // Raw ACL checks are not overridden
        assert!(!auth.has_table_access("Bugs", &anonymous, PermissionScope::Reader));
    }
}
