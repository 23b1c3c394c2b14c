use std::time::Duration;
use crate::auth::cache::RuntimeCache;
use crate::auth::principal::Principal;
use crate::core::config::Config;
use crate::core::error::{Error, Result};

/// Cached group-membership checks.
///
/// Entries are keyed `UserInGroup:{name}:{role}`. A negative answer is cached
/// exactly like a positive one.
pub struct ClaimsAuthenticationService {
    cache: RuntimeCache<bool>,
    ttl: Duration,
}

impl ClaimsAuthenticationService {
    pub fn new(ttl: Duration) -> Self {
        ClaimsAuthenticationService { cache: RuntimeCache::new(), ttl }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.group_cache_ttl())
    }

    pub fn is_user_in_group(&self, principal: &dyn Principal, role: &str) -> Result<bool> {
        if role.trim().is_empty() {
            return Err(Error::not_provided("roleName"));
        }
        if !principal.is_authenticated() || principal.name().is_empty() {
            return Ok(false);
        }

        let key = format!("UserInGroup:{}:{}", principal.name(), role);
        Ok(self.cache.get_or_add(&key, || principal.is_in_role(role), self.ttl))
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl Default for ClaimsAuthenticationService {
    fn default() -> Self {
        Self::new(Duration::from_secs(15 * 60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use crate::auth::principal::ClaimsPrincipal;

    struct Counting {
        inner: ClaimsPrincipal,
        lookups: AtomicUsize,
    }

    impl Principal for Counting {
        fn name(&self) -> &str {
            self.inner.name()
        }

        fn is_authenticated(&self) -> bool {
            self.inner.is_authenticated()
        }

        fn is_in_role(&self, role: &str) -> bool {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.is_in_role(role)
        }
    }

    #[test]
    fn caches_both_answers() {
        let claims = ClaimsAuthenticationService::default();
        let user = Counting {
            inner: ClaimsPrincipal::authenticated("visouza", ["devs"]),
            lookups: AtomicUsize::new(0),
        };

        for _ in 0..3 {
            assert!(claims.is_user_in_group(&user, "devs").unwrap());
            assert!(!claims.is_user_in_group(&user, "admins").unwrap());
        }
        assert_eq!(user.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(claims.cached_entries(), 2);
    }

    #[test]
    fn anonymous_is_never_a_member() {
        let claims = ClaimsAuthenticationService::default();
        assert!(!claims.is_user_in_group(&ClaimsPrincipal::anonymous(), "devs").unwrap());
        assert!(claims.is_user_in_group(&ClaimsPrincipal::anonymous(), " ").is_err());
        assert_eq!(claims.cached_entries(), 0);
    }
}
