//! Bounded LRU membership cache.
//!
//! `LruCache` remembers a bounded set of keys with O(1) slab-based LRU
//! eviction. Every lookup or insert is an access and promotes the key to
//! most-recently-used; once the cache is over capacity the least recently
//! used key is dropped. There is no time-based expiry.
//!
//! The cache is not synchronized. Owners that share it across threads
//! must lock around it.

use std::hash::Hash;

use fxhash::FxHashMap;

/// A slab node in the intrusive doubly-linked LRU list.
struct LruNode<K> {
    key: K,
    prev: usize,
    next: usize,
}

/// Sentinel value for null pointers in the linked list.
const SENTINEL: usize = usize::MAX;

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatistics {
    /// Number of keys currently cached.
    pub size: usize,
    /// Cumulative lookups that found their key.
    pub hits: u64,
    /// Cumulative lookups that did not.
    pub misses: u64,
    /// Cumulative evictions.
    pub evictions: u64,
}

/// O(1) slab-based LRU set.
///
/// Uses an `FxHashMap<K, usize>` for key→slot lookup and a `Vec<LruNode>`
/// slab with intrusive doubly-linked list pointers for recency ordering.
pub struct LruCache<K> {
    index: FxHashMap<K, usize>,
    slab: Vec<LruNode<K>>,
    free: Vec<usize>,
    /// Most recently used.
    head: usize,
    /// Least recently used.
    tail: usize,
    max_entries: usize,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl<K: Hash + Eq + Clone> LruCache<K> {
    /// Creates a cache that preallocates room for `min_entries` keys and
    /// holds at most `max_entries` (at least one).
    #[must_use]
    pub fn new(min_entries: usize, max_entries: usize) -> Self {
        let max_entries = max_entries.max(1);
        let initial = min_entries.min(max_entries);
        let mut index = FxHashMap::default();
        index.reserve(initial);
        Self {
            index,
            slab: Vec::with_capacity(initial),
            free: Vec::new(),
            head: SENTINEL,
            tail: SENTINEL,
            max_entries,
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Looks up a key, promoting it to most-recently-used on hit.
    pub fn contains(&mut self, key: &K) -> bool {
        if let Some(&slot) = self.index.get(key) {
            self.hits += 1;
            self.detach(slot);
            self.push_front(slot);
            true
        } else {
            self.misses += 1;
            false
        }
    }

    /// Checks membership without counting an access.
    #[must_use]
    pub fn peek(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    /// Inserts a key. Returns `true` if it was not already present.
    ///
    /// An existing key is promoted instead.
    pub fn add(&mut self, key: K) -> bool {
        if let Some(&slot) = self.index.get(&key) {
            self.detach(slot);
            self.push_front(slot);
            return false;
        }

        if self.index.len() >= self.max_entries {
            self.evict_tail();
        }

        let node = LruNode {
            key: key.clone(),
            prev: SENTINEL,
            next: SENTINEL,
        };
        let slot = if let Some(free_slot) = self.free.pop() {
            self.slab[free_slot] = node;
            free_slot
        } else {
            self.slab.push(node);
            self.slab.len() - 1
        };

        self.index.insert(key, slot);
        self.push_front(slot);
        true
    }

    /// Inserts every key. Returns `true` if membership changed.
    pub fn add_all(&mut self, keys: impl IntoIterator<Item = K>) -> bool {
        keys.into_iter().fold(false, |changed, key| self.add(key) || changed)
    }

    /// Number of keys currently cached.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Maximum capacity.
    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns size and cumulative hit/miss/eviction counts.
    #[must_use]
    pub fn statistics(&self) -> CacheStatistics {
        CacheStatistics {
            size: self.index.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    /// Clear all entries. Counters are kept.
    pub fn clear(&mut self) {
        self.index.clear();
        self.slab.clear();
        self.free.clear();
        self.head = SENTINEL;
        self.tail = SENTINEL;
    }

    // ── Internal linked-list operations ──

    fn detach(&mut self, slot: usize) {
        let prev = self.slab[slot].prev;
        let next = self.slab[slot].next;

        if prev == SENTINEL {
            self.head = next;
        } else {
            self.slab[prev].next = next;
        }

        if next == SENTINEL {
            self.tail = prev;
        } else {
            self.slab[next].prev = prev;
        }

        self.slab[slot].prev = SENTINEL;
        self.slab[slot].next = SENTINEL;
    }

    fn push_front(&mut self, slot: usize) {
        self.slab[slot].prev = SENTINEL;
        self.slab[slot].next = self.head;

        if self.head != SENTINEL {
            self.slab[self.head].prev = slot;
        }
        self.head = slot;

        if self.tail == SENTINEL {
            self.tail = slot;
        }
    }

    fn evict_tail(&mut self) {
        if self.tail == SENTINEL {
            return;
        }
        let slot = self.tail;
        self.detach(slot);
        self.index.remove(&self.slab[slot].key);
        self.free.push(slot);
        self.evictions += 1;
    }
}

impl<K> std::fmt::Debug for LruCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.index.len())
            .field("max_entries", &self.max_entries)
            .field("hits", &self.hits)
            .field("misses", &self.misses)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_contains() {
        let mut cache = LruCache::new(4, 10);
        assert!(cache.add(1));
        assert!(!cache.add(1));
        assert!(cache.contains(&1));
        assert!(!cache.contains(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_eviction_is_lru() {
        let mut cache = LruCache::new(2, 2);
        cache.add(1);
        cache.add(2);
        cache.add(3);

        assert!(!cache.peek(&1));
        assert!(cache.peek(&2));
        assert!(cache.peek(&3));
        assert_eq!(cache.statistics().evictions, 1);
    }

    #[test]
    fn test_lookup_promotes() {
        let mut cache = LruCache::new(2, 2);
        cache.add(1);
        cache.add(2);

        // 1 becomes MRU; 2 is now LRU
        assert!(cache.contains(&1));
        cache.add(3);

        assert!(cache.peek(&1));
        assert!(!cache.peek(&2));
    }

    #[test]
    fn test_re_add_promotes() {
        let mut cache = LruCache::new(2, 2);
        cache.add(1);
        cache.add(2);
        cache.add(1);
        cache.add(3);
        assert!(cache.peek(&1));
        assert!(!cache.peek(&2));
    }

    #[test]
    fn test_add_all_reports_change() {
        let mut cache = LruCache::new(0, 10);
        assert!(cache.add_all([1, 2, 3]));
        assert!(!cache.add_all([1, 2]));
        assert!(cache.add_all([3, 4]));
        assert!(!cache.add_all(Vec::<i64>::new()));
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_statistics() {
        let mut cache = LruCache::new(0, 10);
        cache.add_all([-5, 5]);
        cache.contains(&5); // hit
        cache.contains(&6); // miss
        cache.contains(&-5); // hit
        cache.peek(&6); // not counted

        let stats = cache.statistics();
        assert_eq!(stats.size, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_slab_reuse_and_clear() {
        let mut cache = LruCache::new(0, 2);
        for i in 0..10 {
            cache.add(i);
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.peek(&8));
        assert!(cache.peek(&9));
        assert_eq!(cache.statistics().evictions, 8);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.add(1));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut cache = LruCache::new(0, 0);
        assert_eq!(cache.max_entries(), 1);
        cache.add(1);
        cache.add(2);
        assert_eq!(cache.len(), 1);
        assert!(cache.peek(&2));
    }
}
