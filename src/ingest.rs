//! Deduplication of realtime deliveries.
//!
//! The same logical update can arrive twice (once as a broadcast, once
//! through the change feed), and the two sources are not ordered relative
//! to each other. A [`Ledger`] remembers the newest version seen per entity
//! id so every consumer applies an update at most once and never lets an
//! older version overwrite a newer one.

use std::collections::HashMap;
use std::hash::Hash;

/// Outcome of offering a version to a [`Ledger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// First time this id is seen.
    New,
    /// Seen before, and this version is strictly newer.
    Newer,
    /// Same or older version than the one already applied.
    Stale,
}

impl Freshness {
    /// Whether the update should be applied.
    pub fn is_fresh(self) -> bool {
        !matches!(self, Self::Stale)
    }
}

/// Last applied version per entity id.
#[derive(Debug, Clone)]
pub struct Ledger<K, V> {
    seen: HashMap<K, V>,
}

impl<K, V> Default for Ledger<K, V> {
    fn default() -> Self {
        Self {
            seen: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V: Ord + Clone> Ledger<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `version` for `id` unless an equal or newer one was already
    /// applied (last writer wins).
    pub fn offer(&mut self, id: K, version: V) -> Freshness {
        match self.seen.get_mut(&id) {
            None => {
                self.seen.insert(id, version);
                Freshness::New
            }
            Some(current) if version > *current => {
                *current = version;
                Freshness::Newer
            }
            Some(_) => Freshness::Stale,
        }
    }

    /// The version last applied for `id`.
    pub fn version(&self, id: &K) -> Option<&V> {
        self.seen.get(id)
    }

    pub fn contains(&self, id: &K) -> bool {
        self.seen.contains_key(id)
    }

    /// Forget `id`; a later offer counts as new again.
    pub fn forget(&mut self, id: &K) {
        self.seen.remove(id);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn clear(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_are_stale() {
        let mut ledger = Ledger::new();
        assert_eq!(ledger.offer("m1", 1), Freshness::New);
        assert_eq!(ledger.offer("m1", 1), Freshness::Stale);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn newer_version_wins_older_is_ignored() {
        let mut ledger = Ledger::new();
        ledger.offer("m1", 5);
        assert_eq!(ledger.offer("m1", 3), Freshness::Stale);
        assert_eq!(ledger.offer("m1", 7), Freshness::Newer);
        assert_eq!(ledger.version(&"m1"), Some(&7));
    }

    #[test]
    fn forget_allows_reapplying() {
        let mut ledger = Ledger::new();
        ledger.offer(1_u32, ());
        ledger.forget(&1);
        assert!(ledger.offer(1, ()).is_fresh());
    }
}
