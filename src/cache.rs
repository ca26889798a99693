//! Reference-counted metadata cache.
//!
//! Backends that learn metadata for free (a directory listing that returns
//! stat information, for example) park it here so the next stat of the same
//! URL does not go back to the server. Each `add` is matched by one
//! `take_one`: the entry lives as long as it has outstanding references.
//!
//! ```rust
//! use gridio::MetadataCache;
//!
//! let cache = MetadataCache::new(128);
//! cache.add("srm://host/a", 42u64);
//! cache.add("srm://host/a", 42u64);
//! assert_eq!(cache.take_one("srm://host/a").unwrap(), 42);
//! assert_eq!(cache.take_one("srm://host/a").unwrap(), 42);
//! assert!(cache.take_one("srm://host/a").is_err());
//! ```

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

struct Entry<V> {
    refs: NonZeroUsize,
    value: V,
}

/// A string-keyed cache whose entries carry a reference count.
///
/// The latest `add` for a key refreshes the stored value. Once the cache
/// holds `capacity` entries, adding a new key flushes everything first;
/// there is no time-based expiry.
pub struct MetadataCache<V> {
    capacity: usize,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> MetadataCache<V> {
    /// Create a cache holding at most `capacity` distinct keys.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Entry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add one reference to `key`, storing `value`.
    pub fn add(&self, key: &str, value: V) {
        let mut entries = self.entries();
        if let Some(entry) = entries.get_mut(key) {
            entry.refs = entry.refs.saturating_add(1);
            entry.value = value;
            return;
        }

        if entries.len() >= self.capacity {
            tracing::trace!(capacity = self.capacity, "metadata cache full, flushing");
            entries.clear();
        }
        entries.insert(
            key.to_string(),
            Entry {
                refs: NonZeroUsize::MIN,
                value,
            },
        );
    }

    /// Return a copy of the value and drop one reference.
    ///
    /// The entry disappears with its last reference. A miss leaves the cache
    /// untouched and reports [`Error::NotFound`].
    pub fn take_one(&self, key: &str) -> Result<V> {
        let mut entries = self.entries();
        let entry = entries
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))?;
        let value = entry.value.clone();
        match NonZeroUsize::new(entry.refs.get() - 1) {
            Some(refs) => entry.refs = refs,
            None => {
                entries.remove(key);
            }
        }
        Ok(value)
    }

    /// Delete the entry regardless of its reference count.
    ///
    /// Returns whether an entry existed.
    pub fn remove(&self, key: &str) -> bool {
        self.entries().remove(key).is_some()
    }

    /// Outstanding references for `key` (zero when absent).
    pub fn refs(&self, key: &str) -> usize {
        self.entries().get(key).map_or(0, |entry| entry.refs.get())
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of distinct keys.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<V> fmt::Debug for MetadataCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .entries
            .lock()
            .map(|entries| entries.len())
            .unwrap_or_default();
        f.debug_struct("MetadataCache")
            .field("len", &len)
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refcount_round_trip() {
        let cache = MetadataCache::new(16);
        cache.add("k", 7u32);
        cache.add("k", 7u32);
        assert_eq!(cache.refs("k"), 2);

        assert_eq!(cache.take_one("k").unwrap(), 7);
        assert_eq!(cache.refs("k"), 1);
        assert_eq!(cache.take_one("k").unwrap(), 7);
        assert!(cache.is_empty());

        assert!(matches!(cache.take_one("k"), Err(Error::NotFound(_))));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_add_refreshes_value() {
        let cache = MetadataCache::new(16);
        cache.add("k", 1u32);
        cache.add("k", 2u32);
        assert_eq!(cache.take_one("k").unwrap(), 2);
        assert_eq!(cache.take_one("k").unwrap(), 2);
    }

    #[test]
    fn test_remove_ignores_refcount() {
        let cache = MetadataCache::new(16);
        cache.add("k", 1u32);
        cache.add("k", 1u32);
        assert!(cache.remove("k"));
        assert!(!cache.remove("k"));
        assert!(cache.take_one("k").is_err());
    }

    #[test]
    fn test_full_cache_flushes_on_new_key() {
        let cache = MetadataCache::new(2);
        cache.add("a", 1u32);
        cache.add("b", 2u32);
        // Existing keys never trigger a flush.
        cache.add("a", 1u32);
        assert_eq!(cache.len(), 2);

        cache.add("c", 3u32);
        assert_eq!(cache.len(), 1);
        assert!(cache.take_one("a").is_err());
        assert_eq!(cache.take_one("c").unwrap(), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cache = MetadataCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.add("a", ());
        assert_eq!(cache.len(), 1);
    }
}
