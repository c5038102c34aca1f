// Small in-memory cache with per-entry time-to-live.
//
// Expired entries stay readable through `get_or_stale` so callers can fall
// back to old data when a refresh fails.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// Value returned by [`TtlCache::get_or_stale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness<'a, V> {
    Fresh(&'a V),
    Stale { value: &'a V, age: Duration },
}

impl<'a, V> Freshness<'a, V> {
    pub fn value(&self) -> &'a V {
        match self {
            Freshness::Fresh(v) => v,
            Freshness::Stale { value, .. } => value,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh(_))
    }
}

#[derive(Debug, Clone)]
pub struct TtlCache<K, V> {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    /// Cache holding at most `capacity` entries, each fresh for `ttl`.
    /// A capacity of 0 is treated as 1.
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        TtlCache {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &K, now: Instant) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|e| now.saturating_duration_since(e.inserted_at) < self.ttl)
            .map(|e| &e.value)
    }

    /// Entry for `key` regardless of age.
    pub fn get_or_stale(&self, key: &K) -> Option<Freshness<'_, V>> {
        self.get_or_stale_at(key, Instant::now())
    }

    pub fn get_or_stale_at(&self, key: &K, now: Instant) -> Option<Freshness<'_, V>> {
        self.entries.get(key).map(|e| {
            let age = now.saturating_duration_since(e.inserted_at);
            if age < self.ttl {
                Freshness::Fresh(&e.value)
            } else {
                Freshness::Stale {
                    value: &e.value,
                    age,
                }
            }
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    /// Insert or replace. When full, the oldest entry is evicted first.
    pub fn insert_at(&mut self, key: K, value: V, now: Instant) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
            },
        );
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn fresh_then_stale() {
        let t0 = Instant::now();
        let mut cache = TtlCache::new(TTL, 8);
        cache.insert_at("nfl", 1, t0);

        assert_eq!(cache.get_at(&"nfl", t0 + Duration::from_secs(59)), Some(&1));
        assert_eq!(cache.get_at(&"nfl", t0 + TTL), None);

        let stale = cache.get_or_stale_at(&"nfl", t0 + Duration::from_secs(90)).unwrap();
        assert!(!stale.is_fresh());
        assert_eq!(*stale.value(), 1);
        assert_eq!(
            stale,
            Freshness::Stale {
                value: &1,
                age: Duration::from_secs(90)
            }
        );
    }

    #[test]
    fn replace_refreshes_timestamp() {
        let t0 = Instant::now();
        let mut cache = TtlCache::new(TTL, 8);
        cache.insert_at("k", 1, t0);
        cache.insert_at("k", 2, t0 + Duration::from_secs(50));
        assert_eq!(cache.get_at(&"k", t0 + Duration::from_secs(100)), Some(&2));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn full_cache_evicts_oldest() {
        let t0 = Instant::now();
        let mut cache = TtlCache::new(TTL, 2);
        cache.insert_at("a", 1, t0);
        cache.insert_at("b", 2, t0 + Duration::from_secs(1));
        cache.insert_at("c", 3, t0 + Duration::from_secs(2));

        assert_eq!(cache.len(), 2);
        assert!(cache.get_or_stale_at(&"a", t0).is_none());
        assert!(cache.get_or_stale_at(&"b", t0).is_some());
        assert!(cache.get_or_stale_at(&"c", t0).is_some());
    }
}
