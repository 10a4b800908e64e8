//! Named atomic counters shared with the host runtime.
//!
//! Counters are the only mutable surface the engine shares across keys, so
//! they are updated through atomics. A host hands the same registry to every
//! per-key engine instance and reads cumulative values after the batch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;

/// Counter name for elements dropped because their window had expired.
pub const DROPPED_DUE_TO_LATENESS: &str = "dropped_due_to_lateness";

/// Counter name for elements accepted into processing.
pub const PROCESSED_ELEMENTS: &str = "processed_elements";

/// A monotonically increasing atomic counter.
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `n` to the counter.
    pub fn inc(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    /// Read the cumulative value.
    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Registry of named counters.
///
/// `counter` returns a handle that can be cached and incremented without
/// further lookups. A disabled registry hands out detached counters whose
/// increments are never published.
#[derive(Debug)]
pub struct MetricsRegistry {
    enabled: bool,
    counters: Mutex<AHashMap<String, Arc<Counter>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            enabled: true,
            counters: Mutex::new(AHashMap::new()),
        }
    }

    /// A registry that swallows all updates.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            counters: Mutex::new(AHashMap::new()),
        }
    }

    /// Get or create the counter with the given name.
    pub fn counter(&self, name: &str) -> Arc<Counter> {
        if !self.enabled {
            return Arc::new(Counter::new());
        }
        let mut counters = self.counters.lock().expect("metrics registry poisoned");
        counters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Counter::new()))
            .clone()
    }

    /// Cumulative value of a named counter; zero if it was never created.
    pub fn value(&self, name: &str) -> u64 {
        let counters = self.counters.lock().expect("metrics registry poisoned");
        counters.get(name).map(|c| c.value()).unwrap_or(0)
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
