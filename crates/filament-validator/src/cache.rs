use std::collections::HashMap;
use std::time::{Duration, Instant};

use filament_core::constants::{CACHE_MAX_ENTRIES, CACHE_SWEEP_INTERVAL_SECS, CACHE_TTL_SECS};
use filament_core::error::FilamentError;
use tracing::debug;

/// One memoized check result.
struct CacheEntry {
    result: Result<(), FilamentError>,
    inserted_at: Instant,
    last_used: Instant,
}

/// Bounded LRU memoization for validation results.
///
/// Keys are stable strings (`sig:<record>`, `integrity:<chain>:<tip>`,
/// `legality:<record>:<chain>`). Entries expire TTL after insertion; a
/// reaper sweeps expired entries on a wall-clock cadence independent of the
/// tick clock. Single-writer under the tick loop.
pub struct ValidationCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    capacity: usize,
    sweep_interval: Duration,
    last_sweep: Instant,
}

impl ValidationCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
            capacity: CACHE_MAX_ENTRIES,
            sweep_interval: Duration::from_secs(CACHE_SWEEP_INTERVAL_SECS),
            last_sweep: Instant::now(),
        }
    }

    pub fn with_capacity(ttl: Duration, capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::new(ttl)
        }
    }

    /// Look up a memoized result. Expired entries are treated as absent and
    /// dropped on contact.
    pub fn get(&mut self, key: &str) -> Option<Result<(), FilamentError>> {
        let expired = match self.entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
        };
        if expired {
            self.entries.remove(key);
            return None;
        }
        let entry = self.entries.get_mut(key).expect("checked above");
        entry.last_used = Instant::now();
        debug!(key, "validation cache hit");
        Some(entry.result.clone())
    }

    /// Memoize a result, evicting the least recently used entry when full.
    pub fn insert(&mut self, key: String, result: Result<(), FilamentError>) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&key) {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                result,
                inserted_at: now,
                last_used: now,
            },
        );
    }

    /// Reaper: drop expired entries if a sweep interval has elapsed since
    /// the last pass. Returns the number of entries removed.
    pub fn maybe_sweep(&mut self) -> usize {
        if self.last_sweep.elapsed() < self.sweep_interval {
            return 0;
        }
        self.sweep()
    }

    /// Unconditional expired-entry sweep.
    pub fn sweep(&mut self) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
        self.last_sweep = Instant::now();
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "cache sweep");
        }
        removed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ValidationCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(CACHE_TTL_SECS))
    }
}
