//! # Policy Registry Module
//!
//! Resolves a service name to its bound balancing policy and caches the
//! resolution for the life of the process. The first resolution for a name
//! goes through the external [`PolicyBinder`] collaborator; concurrent
//! first-calls construct exactly one policy per name.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;

use crate::balancing::counter::ConnectionCounter;
use crate::balancing::policies::{
    BalancingPolicy, LeastConnectionsPolicy, RandomPolicy, RoundRobinPolicy,
};
use crate::core::config::{BalancingConfig, PolicyKind};
use crate::core::error::{BalancerError, BalancerResult};
use crate::discovery::InstanceDirectory;

/// External policy-binding collaborator
///
/// Maps a service name to a freshly constructed policy, or `None` when no
/// binding is configured for that name. The registry caches successful
/// binds, so at most one succeeds per name; a `None` result is not cached
/// and the binder is consulted again on the next resolution, letting a
/// binding that appears later take effect.
pub trait PolicyBinder: Send + Sync {
    fn bind(&self, service: &str) -> Option<Arc<dyn BalancingPolicy>>;
}

/// Binder driven by a [`BalancingConfig`]
///
/// Constructs policies over a shared instance directory; least-connections
/// policies additionally share one connection counter so their accounting
/// and the interceptor's agree.
pub struct ConfigPolicyBinder {
    config: BalancingConfig,
    directory: Arc<dyn InstanceDirectory>,
    counter: Arc<ConnectionCounter>,
}

impl ConfigPolicyBinder {
    pub fn new(
        config: BalancingConfig,
        directory: Arc<dyn InstanceDirectory>,
        counter: Arc<ConnectionCounter>,
    ) -> Self {
        Self {
            config,
            directory,
            counter,
        }
    }
}

impl PolicyBinder for ConfigPolicyBinder {
    fn bind(&self, service: &str) -> Option<Arc<dyn BalancingPolicy>> {
        let kind = self.config.policy_for(service)?;
        debug!(service = %service, policy = %kind, "Binding policy");
        Some(match kind {
            PolicyKind::RoundRobin => Arc::new(RoundRobinPolicy::new(self.directory.clone())),
            PolicyKind::Random => Arc::new(RandomPolicy::new(self.directory.clone())),
            PolicyKind::LeastConnections => Arc::new(LeastConnectionsPolicy::new(
                self.directory.clone(),
                self.counter.clone(),
            )),
        })
    }
}

/// Per-service policy cache with single-construction semantics
pub struct PolicyRegistry {
    binder: Arc<dyn PolicyBinder>,
    cache: DashMap<String, Arc<dyn BalancingPolicy>>,
}

impl PolicyRegistry {
    pub fn new(binder: Arc<dyn PolicyBinder>) -> Self {
        Self {
            binder,
            cache: DashMap::new(),
        }
    }

    /// Resolve the policy bound to a service name
    ///
    /// The first call for a name invokes the binder and caches the result;
    /// later calls return the cached instance without re-invoking it. The
    /// slow path holds the cache entry while constructing, so concurrent
    /// first-calls for the same name cannot race two distinct instances
    /// into the cache.
    ///
    /// # Errors
    /// `UnboundService` when the binder has no configuration for the name.
    pub fn resolve(&self, service: &str) -> BalancerResult<Arc<dyn BalancingPolicy>> {
        if let Some(policy) = self.cache.get(service) {
            return Ok(policy.clone());
        }

        match self.cache.entry(service.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let policy = self
                    .binder
                    .bind(service)
                    .ok_or_else(|| BalancerError::unbound(service))?;
                debug!(
                    service = %service,
                    algorithm = policy.algorithm_name(),
                    "Resolved and cached policy"
                );
                Ok(entry.insert(policy).clone())
            }
        }
    }

    /// Service names with a cached policy
    pub fn cached_services(&self) -> Vec<String> {
        self.cache.iter().map(|entry| entry.key().clone()).collect()
    }
}
