//! Gateway counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by the gateway and its connection pool
#[derive(Debug, Default)]
pub struct GatewayStats {
    calls: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    processes_spawned: AtomicU64,
    teardowns: AtomicU64,
    fallbacks: AtomicU64,
}

macro_rules! counter {
    ($record:ident, $field:ident) => {
        #[doc = concat!("Increment `", stringify!($field), "`")]
        pub fn $record(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl GatewayStats {
    counter!(record_call, calls);
    counter!(record_cache_hit, cache_hits);
    counter!(record_cache_miss, cache_misses);
    counter!(record_spawn, processes_spawned);
    counter!(record_teardown, teardowns);
    counter!(record_fallback, fallbacks);

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            processes_spawned: self.processes_spawned.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
        }
    }
}

/// Copy of [`GatewayStats`] at one instant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct StatsSnapshot {
    /// Tool calls started
    pub calls: u64,
    /// Calls answered from the cache
    pub cache_hits: u64,
    /// Cache lookups that missed
    pub cache_misses: u64,
    /// Tool-server processes started
    pub processes_spawned: u64,
    /// Connections discarded after a timeout or process failure
    pub teardowns: u64,
    /// Calls served by the fallback backend
    pub fallbacks: u64,
}

impl StatsSnapshot {
    /// Fraction of cache lookups that hit
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_hit_rate() {
        let stats = GatewayStats::default();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        stats.record_call();
        stats.record_cache_hit();
        stats.record_cache_hit();
        stats.record_cache_hit();
        stats.record_cache_miss();
        stats.record_spawn();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.calls, 1);
        assert_eq!(snapshot.processes_spawned, 1);
        assert!((snapshot.hit_rate() - 0.75).abs() < f64::EPSILON);
    }
}
