//! Cache hit/miss metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters shared by all clones of a [`crate::Cache`] handle.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub hits:          AtomicU64,
    pub misses:        AtomicU64,
    pub sets:          AtomicU64,
    pub invalidations: AtomicU64,
}

/// Point-in-time snapshot of cache statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    /// Reads that found a live value.
    pub hits:          u64,
    /// Reads that found nothing (including backend errors downgraded to miss).
    pub misses:        u64,
    /// Successful stores.
    pub sets:          u64,
    /// Keys removed by tag invalidation.
    pub invalidations: u64,
    /// hits / (hits + misses), zero when no reads happened.
    pub hit_rate:      f64,
}

impl Counters {
    pub fn snapshot(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let reads = hits + misses;
        #[allow(clippy::cast_precision_loss)]
        let hit_rate = if reads == 0 { 0.0 } else { hits as f64 / reads as f64 };
        CacheStats {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            hit_rate,
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.sets.store(0, Ordering::Relaxed);
        self.invalidations.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_calculation() {
        let counters = Counters::default();
        for _ in 0..8 {
            counters.hits.fetch_add(1, Ordering::Relaxed);
        }
        for _ in 0..2 {
            counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        let stats = counters.snapshot();
        assert_eq!(stats.hits, 8);
        assert_eq!(stats.misses, 2);
        assert!((stats.hit_rate - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_stats_have_zero_hit_rate() {
        let stats = Counters::default().snapshot();
        assert_eq!(stats.hit_rate, 0.0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let counters = Counters::default();
        counters.hits.fetch_add(5, Ordering::Relaxed);
        counters.sets.fetch_add(3, Ordering::Relaxed);
        counters.reset();
        let stats = counters.snapshot();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.sets, 0);
    }
}
