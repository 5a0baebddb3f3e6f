//! TTL LRU over recently seen stack ids
//!
//! The kernel keeps captured stacks in `STACK_ADDRESSES` until userspace
//! deletes them. This cache tracks which ids were seen recently; ids pushed
//! out by capacity or sitting past the TTL are handed back to the caller,
//! which deletes the corresponding kernel entries.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;

pub const STACK_CACHE_CAPACITY: usize = 32;
pub const STACK_CACHE_TTL: Duration = Duration::from_secs(60);

pub struct StackIdCache {
    entries: LruCache<i32, Instant>,
    ttl: Duration,
}

impl StackIdCache {
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self { entries: LruCache::new(capacity), ttl }
    }

    /// Admit a stack id as seen `now`. Returns the ids that left the cache,
    /// either pushed out by capacity or expired past the TTL.
    pub fn admit(&mut self, stack_id: i32, now: Instant) -> Vec<i32> {
        let mut evicted = Vec::new();

        if let Some((old, _)) = self.entries.push(stack_id, now) {
            // push returns the displaced LRU pair, or the previous value for
            // a re-admitted id (which is not an eviction)
            if old != stack_id {
                evicted.push(old);
            }
        }

        while let Some((&oldest, &seen_at)) = self.entries.peek_lru() {
            if now.saturating_duration_since(seen_at) <= self.ttl {
                break;
            }
            self.entries.pop_lru();
            evicted.push(oldest);
        }

        evicted
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_eviction_is_lru_ordered() {
        let now = Instant::now();
        let mut cache = StackIdCache::new(2, Duration::from_secs(60));
        assert!(cache.admit(1, now).is_empty());
        assert!(cache.admit(2, now).is_empty());
        assert_eq!(cache.admit(3, now), vec![1]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_readmission_refreshes_recency() {
        let now = Instant::now();
        let mut cache = StackIdCache::new(2, Duration::from_secs(60));
        cache.admit(1, now);
        cache.admit(2, now);
        assert!(cache.admit(1, now).is_empty()); // not an eviction
        assert_eq!(cache.admit(3, now), vec![2]);
    }

    #[test]
    fn test_ttl_expiry() {
        let base = Instant::now();
        let mut cache = StackIdCache::new(32, Duration::from_secs(60));
        cache.admit(1, base);
        cache.admit(2, base + Duration::from_secs(30));
        let evicted = cache.admit(3, base + Duration::from_secs(61));
        assert_eq!(evicted, vec![1]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_ttl_expires_multiple_entries() {
        let base = Instant::now();
        let mut cache = StackIdCache::new(32, Duration::from_secs(60));
        cache.admit(1, base);
        cache.admit(2, base);
        let mut evicted = cache.admit(3, base + Duration::from_secs(120));
        evicted.sort_unstable();
        assert_eq!(evicted, vec![1, 2]);
    }
}
