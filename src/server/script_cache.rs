//! LRU cache of script bodies keyed by identity.

use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Statistics for script cache monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptCacheStats {
    /// Number of identity lookups
    pub lookups: u64,
    /// Lookups that found a body
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Bodies evicted to stay under capacity
    pub evictions: u64,
}

/// Thread-safe identity → body cache.
///
/// Uses a HashMap for lookups and a VecDeque for recency order, most
/// recently used at the back.
#[derive(Debug)]
pub struct ScriptCache {
    /// Maximum number of entries, 0 for unbounded
    capacity: usize,
    entries: RwLock<HashMap<String, Arc<str>>>,
    lru_queue: RwLock<VecDeque<String>>,
    stats: RwLock<ScriptCacheStats>,
}

impl ScriptCache {
    /// Creates a cache holding at most `capacity` bodies (0 = unbounded).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(HashMap::new()),
            lru_queue: RwLock::new(VecDeque::new()),
            stats: RwLock::new(ScriptCacheStats::default()),
        }
    }

    /// Looks up a body by identity, marking it recently used.
    pub fn get(&self, sha1: &str) -> Option<Arc<str>> {
        let found = self.entries.read().get(sha1).cloned();
        let mut stats = self.stats.write();
        stats.lookups += 1;
        match found {
            Some(body) => {
                stats.hits += 1;
                drop(stats);
                self.touch(sha1);
                Some(body)
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Returns true if `sha1` is cached. Does not affect recency or stats.
    pub fn contains(&self, sha1: &str) -> bool {
        self.entries.read().contains_key(sha1)
    }

    /// Caches `body` under `sha1`, evicting the least recently used entry if full.
    pub fn insert(&self, sha1: String, body: Arc<str>) {
        let mut entries = self.entries.write();
        let mut lru_queue = self.lru_queue.write();

        if entries.insert(sha1.clone(), body).is_some() {
            lru_queue.retain(|k| k != &sha1);
        }
        lru_queue.push_back(sha1);

        while self.capacity > 0 && entries.len() > self.capacity {
            let Some(victim) = lru_queue.pop_front() else { break };
            entries.remove(&victim);
            self.stats.write().evictions += 1;
            log::debug!("evicted least recently used script {}", victim);
        }
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
        self.lru_queue.write().clear();
    }

    /// Number of cached bodies.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the statistics.
    pub fn stats(&self) -> ScriptCacheStats {
        self.stats.read().clone()
    }

    fn touch(&self, sha1: &str) {
        let mut lru_queue = self.lru_queue.write();
        if let Some(pos) = lru_queue.iter().position(|k| k == sha1) {
            if let Some(key) = lru_queue.remove(pos) {
                lru_queue.push_back(key);
            }
        }
    }
}
