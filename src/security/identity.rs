use std::fmt;
use std::hash::{Hash, Hasher};
use serde::{Deserialize, Serialize};
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityScope {
    User,
    Group,
}

/// Access level on a table or the database. Levels are checked
/// independently; holding Owner does not imply Reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PermissionScope {
    Reader,
    Writer,
    Owner,
}

impl PermissionScope {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reader" | "read" => Ok(PermissionScope::Reader),
            "writer" | "write" => Ok(PermissionScope::Writer),
            "owner" | "admin" => Ok(PermissionScope::Owner),
            _ => Err(Error::new(
                ErrorKind::InvalidArgument,
                format!("Permission scope '{value}' is not one of reader, writer, owner"),
            )),
        }
    }
}

impl fmt::Display for PermissionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionScope::Reader => "Reader",
            PermissionScope::Writer => "Writer",
            PermissionScope::Owner => "Owner",
        })
    }
}

/// A user or group named in an ACL. Names compare case-insensitively.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityIdentity {
    pub scope: IdentityScope,
    pub name: String,
}

impl SecurityIdentity {
    pub fn new(scope: IdentityScope, name: &str) -> Self {
        SecurityIdentity { scope, name: name.to_string() }
    }

    pub fn user(name: &str) -> Self {
        Self::new(IdentityScope::User, name)
    }

    pub fn group(name: &str) -> Self {
        Self::new(IdentityScope::Group, name)
    }
}

impl PartialEq for SecurityIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl Eq for SecurityIdentity {}

impl Hash for SecurityIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scope.hash(state);
        self.name.to_ascii_lowercase().hash(state);
    }
}

impl fmt::Display for SecurityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            IdentityScope::User => write!(f, "u:{}", self.name),
            IdentityScope::Group => write!(f, "g:{}", self.name),
        }
    }
}
