//! Generic bucket-partition state tracker (§5), grounded on `StateManager`
//! in `adlfs/transfer.py`. Used at two levels by the transfer engine: files
//! (keyed by destination path) and chunks (keyed by `(file, offset)`), so
//! completion/failure conditions become set-containment checks rather than
//! scans over a flat collection.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Named buckets, each holding a set of keys. A key lives in exactly one
/// bucket at a time; re-inserting it moves it.
#[derive(Debug, Clone)]
pub struct StateManager<K: Eq + Hash + Clone, S: Eq + Hash + Clone> {
    buckets: HashMap<S, HashSet<K>>,
    current: HashMap<K, S>,
}

impl<K: Eq + Hash + Clone, S: Eq + Hash + Clone> StateManager<K, S> {
    pub fn new(states: impl IntoIterator<Item = S>) -> Self {
        let mut buckets = HashMap::new();
        for s in states {
            buckets.insert(s, HashSet::new());
        }
        Self {
            buckets,
            current: HashMap::new(),
        }
    }

    /// Move `key` into bucket `state`, removing it from any prior bucket.
    pub fn set(&mut self, key: K, state: S) {
        if let Some(prev) = self.current.get(&key) {
            if let Some(set) = self.buckets.get_mut(prev) {
                set.remove(&key);
            }
        }
        self.buckets.entry(state.clone()).or_default().insert(key.clone());
        self.current.insert(key, state);
    }

    pub fn state_of(&self, key: &K) -> Option<&S> {
        self.current.get(key)
    }

    pub fn bucket(&self, state: &S) -> impl Iterator<Item = &K> {
        self.buckets.get(state).into_iter().flatten()
    }

    pub fn bucket_len(&self, state: &S) -> usize {
        self.buckets.get(state).map_or(0, |s| s.len())
    }

    /// True if every tracked key is in one of `states`.
    pub fn contains_all(&self, states: &[S]) -> bool {
        let allowed: HashSet<&S> = states.iter().collect();
        self.current.values().all(|s| allowed.contains(s))
    }

    /// True if no tracked key is in any of `states`.
    pub fn contains_none(&self, states: &[S]) -> bool {
        let forbidden: HashSet<&S> = states.iter().collect();
        self.current.values().all(|s| !forbidden.contains(s))
    }

    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.current.keys()
    }

    pub fn clear(&mut self) {
        self.current.clear();
        for set in self.buckets.values_mut() {
            set.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum St {
        Pending,
        Running,
        Done,
        Errored,
    }

    #[test]
    fn moving_a_key_removes_it_from_its_old_bucket() {
        let mut sm: StateManager<&str, St> = StateManager::new([St::Pending, St::Running, St::Done, St::Errored]);
        sm.set("a", St::Pending);
        sm.set("a", St::Running);
        assert_eq!(sm.bucket_len(&St::Pending), 0);
        assert_eq!(sm.bucket_len(&St::Running), 1);
    }

    #[test]
    fn contains_all_and_none_reflect_bucket_membership() {
        let mut sm: StateManager<&str, St> = StateManager::new([St::Pending, St::Running, St::Done, St::Errored]);
        sm.set("a", St::Done);
        sm.set("b", St::Done);
        assert!(sm.contains_all(&[St::Done]));
        assert!(sm.contains_none(&[St::Errored]));
        sm.set("b", St::Errored);
        assert!(!sm.contains_all(&[St::Done]));
        assert!(!sm.contains_none(&[St::Errored]));
    }
}
