//! Mark-and-sweep cache for reusable per-frame objects.
//!
//! Renderers rebuild their display list every frame but want to keep the
//! expensive objects behind it (GPU instances, layout nodes) alive while they
//! stay on screen. A sweep looks like:
//!
//! ```
//! use genome_tiles::UsageCache;
//!
//! let mut nodes: UsageCache<String> = UsageCache::new();
//!
//! nodes.mark_all_unused();
//! nodes.get("chr1:0:1024", || "node".to_string());
//! let disposed = nodes.remove_unused(|_node| { /* release GPU resources */ });
//! assert_eq!(disposed, 0);
//! assert_eq!(nodes.len(), 1);
//! ```
//!
//! Entries acquired with [`UsageCache::get`] since the last
//! [`UsageCache::mark_all_unused`] survive [`UsageCache::remove_unused`];
//! every other entry is handed to the dispose function exactly once and
//! removed.

use std::collections::HashMap;
use std::fmt;

struct Entry<T> {
    value: T,
    used: bool,
}

/// Keyed cache of reusable objects with per-sweep usage tracking.
pub struct UsageCache<T> {
    entries: HashMap<String, Entry<T>>,
}

impl<T> Default for UsageCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> UsageCache<T> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a sweep: flag every entry as unused without removing anything.
    pub fn mark_all_unused(&mut self) {
        for entry in self.entries.values_mut() {
            entry.used = false;
        }
    }

    /// Return the entry for `key`, creating it with `factory` if missing,
    /// and flag it as used.
    pub fn get<F>(&mut self, key: &str, factory: F) -> &mut T
    where
        F: FnOnce() -> T,
    {
        let entry = self
            .entries
            .entry(key.to_owned())
            .or_insert_with(|| Entry {
                value: factory(),
                used: true,
            });
        entry.used = true;
        &mut entry.value
    }

    /// Store `value` under `key`, flagged as used, and return the entry it
    /// replaced without disposing it.
    pub fn replace(&mut self, key: &str, value: T) -> Option<T> {
        self.entries
            .insert(key.to_owned(), Entry { value, used: true })
            .map(|entry| entry.value)
    }

    /// Flag `key` as unused, even if it was acquired during this sweep.
    ///
    /// Returns false if there is no such entry.
    pub fn mark_unused(&mut self, key: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.used = false;
                true
            }
            None => false,
        }
    }

    /// Dispose and remove every entry still flagged as unused.
    ///
    /// Returns the number of entries disposed.
    pub fn remove_unused<F>(&mut self, mut dispose: F) -> usize
    where
        F: FnMut(T),
    {
        let unused: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.used)
            .map(|(key, _)| key.clone())
            .collect();

        let mut disposed = 0;
        for key in unused {
            if let Some(entry) = self.entries.remove(&key) {
                dispose(entry.value);
                disposed += 1;
            }
        }
        disposed
    }

    /// Dispose and remove every entry.
    pub fn clear<F>(&mut self, dispose: F) -> usize
    where
        F: FnMut(T),
    {
        self.mark_all_unused();
        self.remove_unused(dispose)
    }

    /// Existing entry for `key`, without changing its usage flag.
    pub fn peek(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Whether `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `key` is present and flagged as used in this sweep.
    pub fn is_used(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|entry| entry.used)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all entries mutably, used or not.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> + '_ {
        self.entries
            .iter_mut()
            .map(|(key, entry)| (key.as_str(), &mut entry.value))
    }
}

impl<T> fmt::Debug for UsageCache<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let used = self.entries.values().filter(|entry| entry.used).count();
        f.debug_struct("UsageCache")
            .field("entries", &self.entries.len())
            .field("used", &used)
            .finish()
    }
}
