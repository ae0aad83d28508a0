use super::KvStore;
use crate::error::{Result, SatchelError};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// In-memory key-value store.
///
/// Serves two roles: the volatile (session-lifetime) tier in production, and
/// the test double for both tiers. A `BTreeMap` keeps the `key_at` iteration
/// view deterministic.
///
/// Uses `RefCell` for interior mutability since satchel is single-threaded.
/// This avoids the overhead of `RwLock` while still allowing the
/// `KvStore` trait to use `&self` for all methods.
pub struct MemStore {
    entries: RefCell<BTreeMap<String, String>>,
    quota: Option<usize>,
    simulate_write_error: RefCell<bool>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            quota: None,
            simulate_write_error: RefCell::new(false),
        }
    }
}

impl MemStore {
    /// Unbounded store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the store at `bytes`, counted as `key.len() + value.len()`
    /// summed over all entries.
    pub fn with_quota(mut self, bytes: usize) -> Self {
        self.quota = Some(bytes);
        self
    }

    /// Enable write error simulation for testing exhaustion handling.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        *self.simulate_write_error.borrow_mut() = simulate;
    }

    /// Current occupancy under the quota accounting.
    pub fn used_bytes(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if *self.simulate_write_error.borrow() {
            return Err(SatchelError::Store("Simulated write error".to_string()));
        }

        if let Some(quota) = self.quota {
            let entries = self.entries.borrow();
            let current: usize = entries.iter().map(|(k, v)| k.len() + v.len()).sum();
            let replaced = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let projected = current - replaced + key.len() + value.len();
            if projected > quota {
                return Err(SatchelError::CapacityExceeded(format!(
                    "{} bytes needed, quota is {}",
                    projected, quota
                )));
            }
        }

        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }

    fn key_at(&self, index: usize) -> Option<String> {
        self.entries.borrow().keys().nth(index).cloned()
    }

    fn len(&self) -> usize {
        self.entries.borrow().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_counts_keys_and_values() {
        let store = MemStore::new().with_quota(10);

        // "abc" + "def" = 6 bytes, fits
        store.set("abc", "def").unwrap();

        // "wxyz" + "wxyz" = 8 more would overflow
        let err = store.set("wxyz", "wxyz").unwrap_err();
        assert!(matches!(err, SatchelError::CapacityExceeded(_)));

        // The failed write must not have landed
        assert_eq!(store.get("wxyz"), None);
        assert_eq!(store.used_bytes(), 6);
    }

    #[test]
    fn test_overwrite_counts_replacement_not_sum() {
        let store = MemStore::new().with_quota(10);
        store.set("k", "12345678").unwrap(); // 9 bytes

        // Replacing with a same-size value stays within quota
        store.set("k", "87654321").unwrap();
        assert_eq!(store.get("k"), Some("87654321".to_string()));
    }

    #[test]
    fn test_simulated_write_error() {
        let store = MemStore::new();
        store.set_simulate_write_error(true);
        assert!(store.set("k", "v").is_err());

        store.set_simulate_write_error(false);
        assert!(store.set("k", "v").is_ok());
    }

    #[test]
    fn test_key_at_is_stable_and_bounded() {
        let store = MemStore::new();
        store.set("b", "2").unwrap();
        store.set("a", "1").unwrap();

        assert_eq!(store.key_at(0), Some("a".to_string()));
        assert_eq!(store.key_at(1), Some("b".to_string()));
        assert_eq!(store.key_at(2), None);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let store = MemStore::new();
        store.remove("ghost");
        assert!(store.is_empty());
    }
}
