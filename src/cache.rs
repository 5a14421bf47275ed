//! Bounded per-key state with async locking.
//!
//! Tutor conversations and transcript indexes live here. Each key owns a
//! `tokio::sync::Mutex`, so concurrent requests for one key run one at a time
//! while different keys proceed in parallel. The map is capped: idle entries
//! expire after a TTL and the least recently used entry goes first when the
//! cap is exceeded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

struct CacheEntry<V> {
    slot: Arc<Mutex<V>>,
    last_access_ms: AtomicU64,
}

pub struct KeyedCache<V> {
    name: &'static str,
    entries: DashMap<String, CacheEntry<V>>,
    capacity: usize,
    idle_ttl: Duration,
    epoch: Instant,
}

impl<V: Default + Send + 'static> KeyedCache<V> {
    pub fn new(name: &'static str, capacity: usize, idle_ttl: Duration) -> Self {
        Self {
            name,
            entries: DashMap::new(),
            capacity: capacity.max(1),
            idle_ttl,
            epoch: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Lock the value for `key`, creating a default one if absent.
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<V> {
        let now = self.now_ms();
        let (slot, inserted) = {
            let mut inserted = false;
            let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| {
                inserted = true;
                CacheEntry {
                    slot: Arc::new(Mutex::new(V::default())),
                    last_access_ms: AtomicU64::new(now),
                }
            });
            // An idle entry nobody holds starts over.
            if self.is_expired(&entry, now) && Arc::strong_count(&entry.slot) == 1 {
                entry.slot = Arc::new(Mutex::new(V::default()));
                debug!(cache = self.name, key = %key, "Reset idle entry");
            }
            entry.last_access_ms.store(now, Ordering::Relaxed);
            (entry.slot.clone(), inserted)
        };

        if inserted {
            self.evict(key);
        }

        slot.lock_owned().await
    }

    /// Lock the value for `key` only if it is already cached.
    pub async fn lock_existing(&self, key: &str) -> Option<OwnedMutexGuard<V>> {
        let now = self.now_ms();
        let slot = {
            let entry = self.entries.get(key)?;
            if self.is_expired(&entry, now) {
                None
            } else {
                entry.last_access_ms.store(now, Ordering::Relaxed);
                Some(entry.slot.clone())
            }
        };

        match slot {
            Some(slot) => Some(slot.lock_owned().await),
            None => {
                self.entries.remove(key);
                None
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn is_expired(&self, entry: &CacheEntry<V>, now: u64) -> bool {
        let last = entry.last_access_ms.load(Ordering::Relaxed);
        now.saturating_sub(last) > self.idle_ttl.as_millis() as u64
    }

    /// Drop expired entries, then least recently used ones over the cap.
    ///
    /// Entries currently held by a caller are never evicted, nor is `keep`.
    fn evict(&self, keep: &str) {
        let now = self.now_ms();

        // Snapshot first; removing while iterating would deadlock the shard.
        let mut candidates: Vec<(String, u64, bool)> = self
            .entries
            .iter()
            .filter(|e| e.key() != keep && Arc::strong_count(&e.value().slot) == 1)
            .map(|e| {
                (
                    e.key().clone(),
                    e.value().last_access_ms.load(Ordering::Relaxed),
                    self.is_expired(e.value(), now),
                )
            })
            .collect();

        for (key, _, expired) in &candidates {
            if *expired {
                self.entries.remove(key);
                debug!(cache = self.name, key = %key, "Evicted idle entry");
            }
        }
        candidates.retain(|(_, _, expired)| !expired);
        candidates.sort_by_key(|(_, last, _)| *last);

        let mut over = self.entries.len().saturating_sub(self.capacity);
        for (key, _, _) in candidates {
            if over == 0 {
                break;
            }
            if self.entries.remove(&key).is_some() {
                debug!(cache = self.name, key = %key, "Evicted least recently used entry");
                over -= 1;
            }
        }
    }
}
