use std::collections::HashSet;

/// The caller of an operation, as the authentication layer established it.
pub trait Principal: Send + Sync {
    fn name(&self) -> &str;
    fn is_authenticated(&self) -> bool;
    /// Group or role membership, usually an expensive directory lookup.
    fn is_in_role(&self, role: &str) -> bool;
}

/// A principal carrying its group claims.
#[derive(Debug, Clone, Default)]
pub struct ClaimsPrincipal {
    name: String,
    authenticated: bool,
    roles: HashSet<String>, // lowercase
}

impl ClaimsPrincipal {
    pub fn authenticated<I, S>(name: &str, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ClaimsPrincipal {
            name: name.to_string(),
            authenticated: true,
            roles: roles.into_iter().map(|r| r.as_ref().to_lowercase()).collect(),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl Principal for ClaimsPrincipal {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn is_in_role(&self, role: &str) -> bool {
        self.roles.contains(&role.to_lowercase())
    }
}
