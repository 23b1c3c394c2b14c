use std::collections::HashMap;
use std::time::{Duration, Instant};
use parking_lot::Mutex;

/// Key/value cache with per-entry time to live and no other eviction.
pub struct RuntimeCache<V> {
    entries: Mutex<HashMap<String, (V, Instant)>>, // value, expiry
}

impl<V: Clone> RuntimeCache<V> {
    pub fn new() -> Self {
        RuntimeCache { entries: Mutex::new(HashMap::new()) }
    }

    /// Cached value for `key`, or `produce()` stored for `ttl`.
    ///
    /// `produce` runs outside the lock; concurrent misses may both run it.
    pub fn get_or_add(&self, key: &str, produce: impl FnOnce() -> V, ttl: Duration) -> V {
        let now = Instant::now();
        if let Some((value, expires)) = self.entries.lock().get(key) {
            if *expires > now {
                return value.clone();
            }
        }

        let value = produce();
        self.entries.lock().insert(key.to_string(), (value.clone(), now + ttl));
        value
    }

    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V: Clone> Default for RuntimeCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn caches_until_expiry() {
        let cache = RuntimeCache::new();
        let calls = Cell::new(0);
        let produce = || {
            calls.set(calls.get() + 1);
            false
        };

        assert!(!cache.get_or_add("k", produce, Duration::from_secs(60)));
        assert!(!cache.get_or_add("k", produce, Duration::from_secs(60)));
        assert_eq!(calls.get(), 1);

        assert!(!cache.get_or_add("short", produce, Duration::ZERO));
        assert!(!cache.get_or_add("short", produce, Duration::ZERO));
        assert_eq!(calls.get(), 3);
    }
}
