use std::collections::BTreeMap;
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use crate::auth::authorization::Authorizer;
use crate::auth::principal::Principal;
use crate::core::details::{ExecutionDetails, VerificationLevel};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::DataBlock;
use crate::correctors::{ComposedCorrector, Corrector, MeCorrector};
use crate::query::engine::is_restricted;
use crate::query::parser::parse_where;
use crate::query::results::{DeleteResult, TableInformation};
use crate::schema::schema::ColumnDetails;
use crate::security::identity::{IdentityScope, PermissionScope, SecurityIdentity};
use crate::security::permissions::SecurityPermissions;
use crate::security::secure_database::SecureDatabase;
use crate::service::checks::{require_access, require_non_blank, require_table};
use crate::table::table::AddOrUpdateOptions;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateTableRequest {
    pub table_name: String,
    pub item_count_limit: Option<usize>,
    pub columns: Vec<ColumnDetails>,
    pub permissions: Option<SecurityPermissions>,
}

impl CreateTableRequest {
    pub fn new(table_name: &str, columns: Vec<ColumnDetails>) -> Self {
        CreateTableRequest {
            table_name: table_name.to_string(),
            columns,
            ..Self::default()
        }
    }
}

/// Table lifecycle, schema, row and ACL operations on behalf of a caller.
pub struct ManagementService {
    database: Arc<SecureDatabase>,
    authorizer: Arc<Authorizer>,
    correctors: Arc<ComposedCorrector>,
}

impl ManagementService {
    pub fn new(database: Arc<SecureDatabase>, authorizer: Arc<Authorizer>, correctors: Arc<ComposedCorrector>) -> Self {
        ManagementService { database, authorizer, correctors }
    }

    // "me" first so later correctors see the caller's name
    fn current_correctors(&self, user: &dyn Principal) -> ComposedCorrector {
        ComposedCorrector::new(vec![Box::new(MeCorrector::new(user.name())), Box::new(self.correctors.clone())])
    }

    pub fn add_columns(&self, table_name: &str, columns: Vec<ColumnDetails>, user: &dyn Principal) -> Result<()> {
        require_non_blank(table_name, "tableName")?;
        if columns.is_empty() {
            return Err(Error::not_provided("columnDetails"));
        }
        let table = require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Writer)?,
            "User not authorized",
        )?;
        table.add_columns(columns)
    }

    /// Create, save and describe a new table. When the request carries
    /// permissions the creator is always made an Owner.
    pub fn create_table(&self, request: CreateTableRequest, user: &dyn Principal) -> Result<Option<TableInformation>> {
        require_non_blank(&request.table_name, "tableName")?;
        require_access(self.authorizer.validate_create_access(user), "Create Table access denied.")?;
        if self.database.table_exists(&request.table_name) {
            return Err(Error::new(
                ErrorKind::TableAlreadyExists,
                format!("Table {} already exists", request.table_name),
            ));
        }

        let name = request.table_name;
        let table = self.database.add_table(&name, request.item_count_limit)?;
        if let Err(e) = table.add_columns(request.columns) {
            self.database.drop_table(&name)?;
            return Err(e);
        }

        if let Some(mut permissions) = request.permissions {
            permissions.grant(IdentityScope::User, user.name(), PermissionScope::Owner);
            self.database.set_security(&name, permissions);
        }

        table.save()?;
        self.database.save_security(&name)?;
        self.get_table_information(&name, user)
    }

    pub fn delete_table(&self, table_name: &str, user: &dyn Principal) -> Result<()> {
        require_non_blank(table_name, "tableName")?;
        require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Writer)?,
            "Operation not authorized",
        )?;
        self.database.drop_table(table_name)
    }

    /// Delete the rows matching `query` after correcting it for the caller.
    pub fn delete_rows(&self, table_name: &str, query: &str, user: &dyn Principal) -> Result<DeleteResult> {
        require_non_blank(table_name, "tableName")?;
        require_non_blank(query, "query")?;
        let table = require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Writer)?,
            "User not authorized",
        )?;

        let where_clause = self.current_correctors(user).correct(parse_where(query)?)?;
        debug!(table = %table_name, where_clause = %where_clause, "deleting rows");
        table.delete(&where_clause)
    }

    pub fn add_or_update_rows(
        &self,
        table_name: &str,
        block: &DataBlock,
        options: AddOrUpdateOptions,
        user: &dyn Principal,
    ) -> Result<()> {
        require_non_blank(table_name, "tableName")?;
        let table = require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Writer)?,
            "User not authorized",
        )?;
        table.add_or_update(block, options)
    }

    pub fn get_database_for_owner(&self, user: &dyn Principal) -> Result<Arc<SecureDatabase>> {
        require_access(
            self.authorizer.validate_database_access(user, PermissionScope::Owner),
            "User has to be an owner to retrieve the database",
        )?;
        Ok(self.database.clone())
    }

    /// `None` when the caller cannot read the table.
    pub fn get_table_information(&self, table_name: &str, user: &dyn Principal) -> Result<Option<TableInformation>> {
        let table = require_table(&self.database, table_name)?;
        if !self.authorizer.has_table_access(table_name, user, PermissionScope::Reader) {
            return Ok(None);
        }

        let restricted = self
            .database
            .get_restricted_columns(table_name, |identity| self.authorizer.is_in_identity(user, identity));
        let columns = table
            .column_details()?
            .into_iter()
            .filter(|c| !is_restricted(&restricted, &c.name))
            .collect();

        Ok(Some(TableInformation {
            name: table.name().to_string(),
            partition_count: table.partition_count()?,
            row_count: table.count()?,
            last_write_time_utc: table.last_write_time()?,
            can_write: self.authorizer.has_table_access(table_name, user, PermissionScope::Writer),
            can_administer: self.authorizer.has_table_access(table_name, user, PermissionScope::Owner),
            columns,
        }))
    }

    pub fn get_tables(&self) -> Vec<String> {
        self.database.table_names()
    }

    /// Information for every table the caller can read, by name.
    pub fn get_tables_for_user(&self, user: &dyn Principal) -> Result<BTreeMap<String, TableInformation>> {
        let mut tables = BTreeMap::new();
        for name in self.database.table_names() {
            if !self.authorizer.has_table_access(&name, user, PermissionScope::Reader) {
                continue;
            }
            if let Some(information) = self.get_table_information(&name, user)? {
                tables.insert(name, information);
            }
        }
        Ok(tables)
    }

    pub fn grant_access(
        &self,
        table_name: &str,
        identity: &SecurityIdentity,
        scope: PermissionScope,
        user: &dyn Principal,
    ) -> Result<()> {
        self.check_security_change(table_name, identity, user)?;
        self.database
            .update_security(table_name, |s| s.grant(identity.scope, &identity.name, scope));
        self.database.save_security(table_name)
    }

    pub fn revoke_access(
        &self,
        table_name: &str,
        identity: &SecurityIdentity,
        scope: PermissionScope,
        user: &dyn Principal,
    ) -> Result<()> {
        self.check_security_change(table_name, identity, user)?;
        self.database
            .update_security(table_name, |s| s.revoke(identity.scope, &identity.name, scope));
        self.database.save_security(table_name)
    }

    fn check_security_change(&self, table_name: &str, identity: &SecurityIdentity, user: &dyn Principal) -> Result<()> {
        require_non_blank(table_name, "tableName")?;
        require_table(&self.database, table_name)?;
        require_non_blank(&identity.name, "name")?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Owner)?,
            "Operation not authorized",
        )
    }

    pub fn reload_table(&self, table_name: &str, user: &dyn Principal) -> Result<()> {
        require_non_blank(table_name, "tableName")?;
        require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Reader)?,
            "Operation not authorized",
        )?;
        self.database.reload_table(table_name)
    }

    /// Verify at `level` (the configured level when `None`), then save only
    /// if verification found nothing wrong.
    pub fn save_table(
        &self,
        table_name: &str,
        level: Option<VerificationLevel>,
        user: &dyn Principal,
    ) -> Result<(bool, ExecutionDetails)> {
        require_non_blank(table_name, "tableName")?;
        let table = require_table(&self.database, table_name)?;
        require_access(
            self.authorizer.validate_table_access(table_name, user, PermissionScope::Writer)?,
            "Not authorized",
        )?;

        let mut details = ExecutionDetails::new();
        let level = level.unwrap_or(self.database.config().verification_level);
        table.verify_consistency(level, &mut details);
        if !details.succeeded() {
            warn!(table = %table_name, errors = ?details.errors, "refusing to save inconsistent table");
            return Ok((false, details));
        }
        table.save()?;
        Ok((true, details))
    }

    /// Needs create access; `false` without it.
    pub fn unload_all(&self, user: &dyn Principal) -> bool {
        if !self.authorizer.validate_create_access(user) {
            return false;
        }
        self.database.unload_all();
        true
    }

    /// `false` when the caller cannot write the table.
    pub fn unload_table(&self, table_name: &str, user: &dyn Principal) -> Result<bool> {
        let table = require_table(&self.database, table_name)?;
        if !self.authorizer.has_table_access(table_name, user, PermissionScope::Writer) {
            return Ok(false);
        }
        table.unload();
        Ok(true)
    }
}
