use std::collections::HashMap;
use std::fs;
use std::ops::Deref;
use parking_lot::RwLock;
use tracing::info;
use crate::core::config::Config;
use crate::core::error::Result;
use crate::query::engine::Query;
use crate::security::identity::SecurityIdentity;
use crate::security::permissions::SecurityPermissions;
use crate::storage::layout::write_atomic;
use crate::storage::serialization::{from_json, to_json};
use crate::table::database::Database;

/// A `Database` plus per-table ACLs. The empty table name holds the
/// database-level ACL.
pub struct SecureDatabase {
    database: Database,
    security: RwLock<HashMap<String, SecurityPermissions>>, // lowercase table name -> ACL
}

impl SecureDatabase {
    pub fn open(config: Config) -> Result<Self> {
        let database = Database::open(config)?;
        let secure = SecureDatabase {
            database,
            security: RwLock::new(HashMap::new()),
        };
        secure.load_security("")?;
        for name in secure.database.table_names() {
            secure.load_security(&name)?;
        }
        Ok(secure)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// ACL for `table`; an empty ACL when none is configured.
    pub fn security(&self, table: &str) -> SecurityPermissions {
        self.security
            .read()
            .get(&table.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn database_permissions(&self) -> SecurityPermissions {
        self.security("")
    }

    pub fn set_security(&self, table: &str, permissions: SecurityPermissions) {
        self.security.write().insert(table.to_lowercase(), permissions);
    }

    /// Edit the ACL for `table` in place.
    pub fn update_security<R>(&self, table: &str, edit: impl FnOnce(&mut SecurityPermissions) -> R) -> R {
        let mut security = self.security.write();
        edit(security.entry(table.to_lowercase()).or_default())
    }

    pub fn save_security(&self, table: &str) -> Result<()> {
        let permissions = self.security(table);
        let path = self.database.storage().security_path(&self.file_name(table));
        write_atomic(&path, to_json(&permissions)?.as_bytes())?;
        info!(table = %table, "saved security");
        Ok(())
    }

    /// Read the persisted ACL for `table`, if there is one.
    pub fn load_security(&self, table: &str) -> Result<()> {
        let path = self.database.storage().security_path(&self.file_name(table));
        if path.exists() {
            let permissions: SecurityPermissions = from_json(&fs::read_to_string(&path)?)?;
            self.set_security(table, permissions);
        }
        Ok(())
    }

    /// Restricted columns of `table` that `is_member` does not exempt the
    /// caller from.
    pub fn get_restricted_columns(&self, table: &str, is_member: impl Fn(&SecurityIdentity) -> bool) -> Vec<String> {
        let security = self.security.read();
        let Some(permissions) = security.get(&table.to_lowercase()) else {
            return Vec::new();
        };

        let mut restricted: Vec<String> = Vec::new();
        for restriction in &permissions.restricted_columns {
            if is_member(&restriction.allowed) {
                continue;
            }
            for column in &restriction.columns {
                if !restricted.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    restricted.push(column.clone());
                }
            }
        }
        restricted
    }

    /// Run `query` on its table, then remove the columns the caller may not see.
    pub fn query<Q: Query>(&self, query: &Q, is_member: impl Fn(&SecurityIdentity) -> bool) -> Result<Q::Output> {
        let table = self.database.table(query.table_name())?;
        let mut output = table.query(query)?;
        let restricted = self.get_restricted_columns(table.name(), is_member);
        if !restricted.is_empty() {
            query.redact(&mut output, &restricted);
        }
        Ok(output)
    }

    /// Drop the table and its ACL.
    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.database.drop_table(name)?;
        self.security.write().remove(&name.to_lowercase());
        Ok(())
    }

    // Files use the table's own casing when it exists.
    fn file_name(&self, table: &str) -> String {
        if table.is_empty() {
            return String::new();
        }
        self.database
            .table(table)
            .map(|t| t.name().to_string())
            .unwrap_or_else(|_| table.to_string())
    }
}

impl Deref for SecureDatabase {
    type Target = Database;

    fn deref(&self) -> &Database {
        &self.database
    }
}
