//! # Balancing Policies Module
//!
//! The three balancing policies sharing one contract: round-robin, random,
//! and least-connections. Each policy owns a handle to the instance
//! directory and fetches the current list on every selection, so registry
//! churn is picked up immediately.
//!
//! ## Selection Semantics
//!
//! - **Round-robin**: atomic cursor advanced once per selection, taken
//!   modulo the list length
//! - **Random**: uniform choice per call, no state across calls
//! - **Least-connections**: initializes counter entries for every current
//!   instance (fresh instances start at 0), then takes the stable
//!   first-encountered minimum under the counter's order
//!
//! All variants surface an explicit `NoInstanceAvailable` error on an
//! empty list; no fallback instance is ever synthesized.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::balancing::counter::ConnectionCounter;
use crate::core::error::{BalancerError, BalancerResult};
use crate::core::types::ServiceInstance;
use crate::discovery::InstanceDirectory;

/// Core trait for balancing policies
///
/// `select` is usable independently of the interceptor, for tests or
/// direct policy invocation.
#[async_trait]
pub trait BalancingPolicy: Send + Sync {
    /// Select an instance of the named service from the current list
    ///
    /// # Errors
    /// `NoInstanceAvailable` if the directory returned an empty list.
    async fn select(&self, service: &str) -> BalancerResult<ServiceInstance>;

    /// Algorithm name for metrics and logging
    fn algorithm_name(&self) -> &'static str;

    /// Whether selections through this policy carry connection accounting
    ///
    /// The interceptor queries this capability flag to decide whether to
    /// bracket the dispatch with counter increments and decrements.
    fn tracks_connections(&self) -> bool {
        false
    }

    /// Current statistics for this policy
    fn stats(&self) -> PolicyStats;
}

impl std::fmt::Debug for dyn BalancingPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BalancingPolicy")
            .field("algorithm", &self.algorithm_name())
            .finish()
    }
}

/// Policy statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct PolicyStats {
    pub algorithm: String,
    pub total_requests: u64,
    pub failed_selections: u64,
    pub instance_stats: HashMap<String, InstanceStats>,
}

/// Per-instance selection statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstanceStats {
    pub selections: u64,
    pub last_selected: Option<DateTime<Utc>>,
}

/// Shared bookkeeping each policy carries
struct SelectionLedger {
    stats: DashMap<String, InstanceStats>,
    total_requests: AtomicUsize,
    failed_selections: AtomicUsize,
}

impl SelectionLedger {
    fn new() -> Self {
        Self {
            stats: DashMap::new(),
            total_requests: AtomicUsize::new(0),
            failed_selections: AtomicUsize::new(0),
        }
    }

    fn record_selection(&self, instance: &ServiceInstance) {
        let mut stats = self
            .stats
            .entry(instance.instance_key())
            .or_insert_with(|| InstanceStats {
                selections: 0,
                last_selected: None,
            });
        stats.selections += 1;
        stats.last_selected = Some(Utc::now());
        counter!("balancer_selections").increment(1);
    }

    fn record_empty_list(&self, service: &str, algorithm: &'static str) -> BalancerError {
        self.failed_selections.fetch_add(1, Ordering::Relaxed);
        counter!("balancer_failed_selections").increment(1);
        warn!(service = %service, algorithm, "No instances available");
        BalancerError::no_instance(service)
    }

    fn to_stats(&self, algorithm: &'static str) -> PolicyStats {
        PolicyStats {
            algorithm: algorithm.to_string(),
            total_requests: self.total_requests.load(Ordering::Relaxed) as u64,
            failed_selections: self.failed_selections.load(Ordering::Relaxed) as u64,
            instance_stats: self
                .stats
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        }
    }
}

/// Round-robin policy with an atomic cursor
///
/// The cursor advances exactly once per selection via `fetch_add`, so
/// concurrent selections never assign the same index twice or corrupt the
/// cursor; it only wraps modulo the current list length.
pub struct RoundRobinPolicy {
    directory: Arc<dyn InstanceDirectory>,
    cursor: AtomicUsize,
    ledger: SelectionLedger,
}

impl RoundRobinPolicy {
    pub fn new(directory: Arc<dyn InstanceDirectory>) -> Self {
        Self {
            directory,
            cursor: AtomicUsize::new(0),
            ledger: SelectionLedger::new(),
        }
    }
}

#[async_trait]
impl BalancingPolicy for RoundRobinPolicy {
    async fn select(&self, service: &str) -> BalancerResult<ServiceInstance> {
        self.ledger.total_requests.fetch_add(1, Ordering::Relaxed);
        let instances = self.directory.fetch_instances(service).await?;
        if instances.is_empty() {
            return Err(self.ledger.record_empty_list(service, self.algorithm_name()));
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % instances.len();
        let selected = instances[index].clone();
        self.ledger.record_selection(&selected);

        debug!(
            service = %service,
            instance = %selected,
            algorithm = "round_robin",
            "Selected instance"
        );
        Ok(selected)
    }

    fn algorithm_name(&self) -> &'static str {
        "round_robin"
    }

    fn stats(&self) -> PolicyStats {
        self.ledger.to_stats(self.algorithm_name())
    }
}

/// Uniform random policy
pub struct RandomPolicy {
    directory: Arc<dyn InstanceDirectory>,
    ledger: SelectionLedger,
}

impl RandomPolicy {
    pub fn new(directory: Arc<dyn InstanceDirectory>) -> Self {
        Self {
            directory,
            ledger: SelectionLedger::new(),
        }
    }
}

#[async_trait]
impl BalancingPolicy for RandomPolicy {
    async fn select(&self, service: &str) -> BalancerResult<ServiceInstance> {
        self.ledger.total_requests.fetch_add(1, Ordering::Relaxed);
        let instances = self.directory.fetch_instances(service).await?;
        if instances.is_empty() {
            return Err(self.ledger.record_empty_list(service, self.algorithm_name()));
        }

        // ThreadRng is !Send; keep it scoped so the future stays Send.
        let index = {
            let mut rng = rand::thread_rng();
            rng.gen_range(0..instances.len())
        };
        let selected = instances[index].clone();
        self.ledger.record_selection(&selected);

        debug!(
            service = %service,
            instance = %selected,
            algorithm = "random",
            "Selected instance"
        );
        Ok(selected)
    }

    fn algorithm_name(&self) -> &'static str {
        "random"
    }

    fn stats(&self) -> PolicyStats {
        self.ledger.to_stats(self.algorithm_name())
    }
}

/// Least-connections policy
///
/// Consults the shared [`ConnectionCounter`] to pick the instance with the
/// fewest in-flight requests. Counter entries are initialized for every
/// instance in the fetched list first, so freshly discovered instances
/// start at 0 and never erroneously appear busiest.
pub struct LeastConnectionsPolicy {
    directory: Arc<dyn InstanceDirectory>,
    counter: Arc<ConnectionCounter>,
    ledger: SelectionLedger,
}

impl LeastConnectionsPolicy {
    pub fn new(directory: Arc<dyn InstanceDirectory>, counter: Arc<ConnectionCounter>) -> Self {
        Self {
            directory,
            counter,
            ledger: SelectionLedger::new(),
        }
    }
}

#[async_trait]
impl BalancingPolicy for LeastConnectionsPolicy {
    async fn select(&self, service: &str) -> BalancerResult<ServiceInstance> {
        self.ledger.total_requests.fetch_add(1, Ordering::Relaxed);
        let instances = self.directory.fetch_instances(service).await?;
        if instances.is_empty() {
            return Err(self.ledger.record_empty_list(service, self.algorithm_name()));
        }

        self.counter.initialize(&instances);

        // min_by keeps the first of equal minima, so ties break by whatever
        // order the directory returned. That order is authoritative here;
        // it is not guaranteed stable across fetches.
        let selected = instances
            .iter()
            .min_by(|a, b| self.counter.compare(a, b))
            .cloned()
            .ok_or_else(|| BalancerError::no_instance(service))?;
        self.ledger.record_selection(&selected);

        debug!(
            service = %service,
            instance = %selected,
            connections = self.counter.count(&selected),
            algorithm = "least_connections",
            "Selected instance with least connections"
        );
        Ok(selected)
    }

    fn algorithm_name(&self) -> &'static str {
        "least_connections"
    }

    fn tracks_connections(&self) -> bool {
        true
    }

    fn stats(&self) -> PolicyStats {
        self.ledger.to_stats(self.algorithm_name())
    }
}
