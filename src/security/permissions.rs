use serde::{Deserialize, Serialize};
use crate::security::identity::{IdentityScope, PermissionScope, SecurityIdentity};

/// Columns hidden from everyone outside `allowed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRestriction {
    pub allowed: SecurityIdentity,
    pub columns: Vec<String>,
}

/// ACL of one table, or of the database under the empty table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityPermissions {
    pub readers: Vec<SecurityIdentity>,
    pub writers: Vec<SecurityIdentity>,
    pub owners: Vec<SecurityIdentity>,
    pub restricted_columns: Vec<ColumnRestriction>,
}

impl SecurityPermissions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any identity granted anything. Without this the table is open to all.
    pub fn has_table_access_security(&self) -> bool {
        !(self.readers.is_empty() && self.writers.is_empty() && self.owners.is_empty())
    }

    pub fn has_restricted_column_security(&self) -> bool {
        self.restricted_columns.iter().any(|r| !r.columns.is_empty())
    }

    fn scope(&self, scope: PermissionScope) -> &Vec<SecurityIdentity> {
        match scope {
            PermissionScope::Reader => &self.readers,
            PermissionScope::Writer => &self.writers,
            PermissionScope::Owner => &self.owners,
        }
    }

    fn scope_mut(&mut self, scope: PermissionScope) -> &mut Vec<SecurityIdentity> {
        match scope {
            PermissionScope::Reader => &mut self.readers,
            PermissionScope::Writer => &mut self.writers,
            PermissionScope::Owner => &mut self.owners,
        }
    }

    /// Add `name` to `scope`; granting twice is a no-op.
    pub fn grant(&mut self, identity_scope: IdentityScope, name: &str, scope: PermissionScope) {
        let identity = SecurityIdentity::new(identity_scope, name);
        let identities = self.scope_mut(scope);
        if !identities.contains(&identity) {
            identities.push(identity);
        }
    }

    pub fn revoke(&mut self, identity_scope: IdentityScope, name: &str, scope: PermissionScope) {
        let identity = SecurityIdentity::new(identity_scope, name);
        self.scope_mut(scope).retain(|i| *i != identity);
    }

    pub fn is_identity_in_permission_scope(&self, identity_scope: IdentityScope, name: &str, scope: PermissionScope) -> bool {
        self.scope(scope).contains(&SecurityIdentity::new(identity_scope, name))
    }

    pub fn get_scope_identities(
        &self,
        scope: PermissionScope,
        identity_scope: IdentityScope,
    ) -> impl Iterator<Item = &SecurityIdentity> {
        self.scope(scope).iter().filter(move |i| i.scope == identity_scope)
    }

    /// Hide `columns` from everyone outside `allowed`, adding to any existing
    /// restriction for the same identity.
    pub fn restrict_columns(&mut self, allowed: SecurityIdentity, columns: &[&str]) {
        let position = self.restricted_columns.iter().position(|r| r.allowed == allowed);
        let restriction = match position {
            Some(i) => &mut self.restricted_columns[i],
            None => {
                self.restricted_columns.push(ColumnRestriction { allowed, columns: Vec::new() });
                let last = self.restricted_columns.len() - 1;
                &mut self.restricted_columns[last]
            }
        };
        for column in columns {
            if !restriction.columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                restriction.columns.push(column.to_string());
            }
        }
    }

    pub fn unrestrict_columns(&mut self, allowed: &SecurityIdentity) {
        self.restricted_columns.retain(|r| r.allowed != *allowed);
    }
}
