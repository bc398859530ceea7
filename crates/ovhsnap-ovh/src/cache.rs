// SPDX-FileCopyrightText: 2026 Ovhsnap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Short-lived availability cache.
//!
//! Coalesces duplicate probes across the queue scheduler and the monitor
//! within one tick; the TTL stays below any reasonable retry interval so it
//! never batches across ticks. A plain mutex-guarded map with per-entry
//! expiry — the bound is small enough that an LRU structure would be noise.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use ovhsnap_core::{AvailabilityState, EndpointRegion};

/// Entry lifetime.
pub const CACHE_TTL: Duration = Duration::from_secs(30);

/// Maximum number of cached readings.
pub const CACHE_CAP: usize = 256;

/// Cache key: one reading per (region, plan, option-fingerprint).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub region: EndpointRegion,
    pub plan_code: String,
    pub fingerprint: u64,
}

struct CacheEntry {
    states: HashMap<String, AvailabilityState>,
    fetched_at: Instant,
}

/// Concurrent-safe availability reading cache.
pub struct AvailabilityCache {
    ttl: Duration,
    cap: usize,
    inner: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl Default for AvailabilityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityCache {
    pub fn new() -> Self {
        Self::with_limits(CACHE_TTL, CACHE_CAP)
    }

    /// Custom TTL and capacity (tests).
    pub fn with_limits(ttl: Duration, cap: usize) -> Self {
        Self {
            ttl,
            cap,
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// A non-expired reading, if present.
    pub fn get(&self, key: &CacheKey) -> Option<HashMap<String, AvailabilityState>> {
        let mut inner = self.inner.lock().expect("availability cache poisoned");
        match inner.get(key) {
            Some(entry) if entry.fetched_at.elapsed() < self.ttl => Some(entry.states.clone()),
            Some(_) => {
                inner.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert a fresh reading, evicting expired entries first and the oldest
    /// entry if still at capacity.
    pub fn insert(&self, key: CacheKey, states: HashMap<String, AvailabilityState>) {
        let mut inner = self.inner.lock().expect("availability cache poisoned");
        let ttl = self.ttl;
        inner.retain(|_, entry| entry.fetched_at.elapsed() < ttl);
        if inner.len() >= self.cap {
            if let Some(oldest) = inner
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(k, _)| k.clone())
            {
                inner.remove(&oldest);
            }
        }
        inner.insert(
            key,
            CacheEntry {
                states,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Number of live entries (expired entries may linger until touched).
    pub fn len(&self) -> usize {
        self.inner.lock().expect("availability cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(plan: &str, fingerprint: u64) -> CacheKey {
        CacheKey {
            region: EndpointRegion::OvhEu,
            plan_code: plan.into(),
            fingerprint,
        }
    }

    fn reading(dc: &str, state: AvailabilityState) -> HashMap<String, AvailabilityState> {
        HashMap::from([(dc.to_string(), state)])
    }

    #[test]
    fn hit_within_ttl() {
        let cache = AvailabilityCache::new();
        cache.insert(key("p", 1), reading("gra", AvailabilityState::Available));
        let hit = cache.get(&key("p", 1)).unwrap();
        assert_eq!(hit["gra"], AvailabilityState::Available);
    }

    #[test]
    fn miss_on_other_fingerprint() {
        let cache = AvailabilityCache::new();
        cache.insert(key("p", 1), reading("gra", AvailabilityState::Available));
        assert!(cache.get(&key("p", 2)).is_none());
    }

    #[test]
    fn expired_entry_is_dropped() {
        let cache = AvailabilityCache::with_limits(Duration::from_millis(0), 16);
        cache.insert(key("p", 1), reading("gra", AvailabilityState::Available));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get(&key("p", 1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = AvailabilityCache::with_limits(Duration::from_secs(60), 2);
        cache.insert(key("p1", 1), reading("gra", AvailabilityState::Available));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(key("p2", 2), reading("rbx", AvailabilityState::Unavailable));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(key("p3", 3), reading("sbg", AvailabilityState::Available));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key("p1", 1)).is_none(), "oldest entry evicted");
        assert!(cache.get(&key("p3", 3)).is_some());
    }
}
