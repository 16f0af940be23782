//! # Connection Counter Module
//!
//! Thread-safe map from instance identity to the number of requests
//! currently in flight against that instance. This is the shared state the
//! least-connections policy reads and the interceptor writes.
//!
//! ## Concurrency Notes
//!
//! - `DashMap` gives atomic per-key insert-if-absent, so `initialize` and
//!   `increment` never lose counts under interleaving
//! - Each count is an `AtomicUsize`; increments and decrements are single
//!   atomic instructions, never read-modify-write on shared data
//! - Entries are never removed: instances that disappear from the registry
//!   leave a stale zero-ish entry behind, which is harmless because
//!   comparisons stay well-defined

use dashmap::DashMap;
use metrics::gauge;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::types::ServiceInstance;

/// Process-local in-flight request counts, keyed by `host:port`
///
/// All operations are defined for any input instance, including ones the
/// counter has never seen; there are no failure modes.
#[derive(Default)]
pub struct ConnectionCounter {
    counts: DashMap<String, AtomicUsize>,
}

impl ConnectionCounter {
    /// Create an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a zero entry exists for every given instance
    ///
    /// Idempotent: existing counts are never overwritten, so a freshly
    /// discovered instance starts at 0 while instances already carrying
    /// load keep their counts. Safe to call concurrently from many request
    /// tasks.
    pub fn initialize(&self, instances: &[ServiceInstance]) {
        for instance in instances {
            self.counts
                .entry(instance.instance_key())
                .or_insert_with(|| AtomicUsize::new(0));
        }
    }

    /// Atomically add 1 to an instance's count, creating a zero entry
    /// first if absent. Returns the new count.
    pub fn increment(&self, instance: &ServiceInstance) -> usize {
        let key = instance.instance_key();
        let counter = self
            .counts
            .entry(key)
            .or_insert_with(|| AtomicUsize::new(0));
        let updated = counter.fetch_add(1, Ordering::Relaxed) + 1;

        gauge!("balancer_active_connections").set(updated as f64);
        updated
    }

    /// Atomically subtract 1 from an instance's count if an entry exists
    ///
    /// A missing entry is a no-op, not an error: the instance set can
    /// legitimately change between increment and decrement. Counts saturate
    /// at zero rather than underflowing.
    pub fn decrement(&self, instance: &ServiceInstance) {
        if let Some(counter) = self.counts.get(&instance.instance_key()) {
            let _ = counter.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                Some(count.saturating_sub(1))
            });
            gauge!("balancer_active_connections").set(counter.load(Ordering::Relaxed) as f64);
        }
    }

    /// Current count for an instance; missing entries read as 0
    pub fn count(&self, instance: &ServiceInstance) -> usize {
        self.counts
            .get(&instance.instance_key())
            .map(|counter| counter.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Compare two instances by their current counts
    ///
    /// Missing entries read as 0, so the order is total over any pair of
    /// instances and usable for minimum selection.
    pub fn compare(&self, a: &ServiceInstance, b: &ServiceInstance) -> CmpOrdering {
        self.count(a).cmp(&self.count(b))
    }

    /// Snapshot of all tracked counts, for diagnostics and tests
    pub fn snapshot(&self) -> HashMap<String, usize> {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Relaxed)))
            .collect()
    }
}
