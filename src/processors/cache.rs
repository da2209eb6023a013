//! Lock-guarded row cache shared by the processors
//!
//! Holds at most one row per composite natural key. `process` may run on
//! bulk-import worker threads while `flush` runs on the lifecycle task,
//! so every access takes the lock.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

pub(crate) struct RowCache<K, R> {
    rows: Mutex<HashMap<K, R>>,
}

impl<K: Eq + Hash, R> RowCache<K, R> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
        }
    }

    /// Insert or replace the row for a natural key. Last write wins.
    pub fn put(&self, key: K, row: R) {
        self.rows.lock().unwrap().insert(key, row);
    }

    /// Drop any pending row for the key, returning whether one was there.
    pub fn remove(&self, key: &K) -> bool {
        self.rows.lock().unwrap().remove(key).is_some()
    }

    /// Drain the cache, leaving it empty.
    pub fn drain(&self) -> Vec<R> {
        self.rows
            .lock()
            .unwrap()
            .drain()
            .map(|(_, row)| row)
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_per_key() {
        let cache: RowCache<(String, String), u64> = RowCache::new();
        cache.put(("a".into(), "x".into()), 1);
        cache.put(("a".into(), "x".into()), 2);
        cache.put(("a".into(), "y".into()), 3);
        assert_eq!(cache.len(), 2);

        let mut rows = cache.drain();
        rows.sort_unstable();
        assert_eq!(rows, vec![2, 3]);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn remove_cancels_pending_rows() {
        let cache: RowCache<u8, u8> = RowCache::new();
        cache.put(1, 10);
        assert!(cache.remove(&1));
        assert!(!cache.remove(&1));
        assert!(cache.drain().is_empty());
    }
}
