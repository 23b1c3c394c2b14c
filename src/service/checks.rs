//! Precondition checks run at the top of every service operation.
//!
//! Order is fixed: missing or blank arguments, then table existence, then
//! permission. A blank name is a validation error even for an anonymous
//! caller, and a missing table is reported before any access decision.

use std::sync::Arc;
use crate::core::error::{Error, Result};
use crate::security::secure_database::SecureDatabase;
use crate::table::table::Table;

pub fn require_non_blank(value: &str, param: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::not_provided(param));
    }
    Ok(())
}

pub fn require_table(database: &SecureDatabase, name: &str) -> Result<Arc<Table>> {
    database.table(name)
}

pub fn require_access(granted: bool, message: &str) -> Result<()> {
    if granted {
        Ok(())
    } else {
        Err(Error::forbidden(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn blank_and_denied() {
        assert_eq!(require_non_blank("  ", "tableName").unwrap_err().context, "Not Provided (Parameter 'tableName')");
        assert!(require_non_blank("Bugs", "tableName").is_ok());
        assert_eq!(require_access(false, "Not authorized").unwrap_err().kind, ErrorKind::Forbidden);
    }
}
