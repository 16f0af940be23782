//! # Instance Directory Module
//!
//! A thin accessor over the external service registry: the only capability
//! the balancing core consumes is "fetch the current instance list for a
//! service name". Registry protocol, health checking, and refresh cadence
//! all live behind the trait.
//!
//! ## Rust Concepts Used
//!
//! - `async_trait` for async methods in traits
//! - `parking_lot::RwLock` for the in-memory implementation's service table
//! - `Arc<dyn InstanceDirectory>` handles shared by every policy

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::core::error::BalancerResult;
use crate::core::types::ServiceInstance;

/// Directory of live service instances
///
/// Implementations wrap whatever discovery backend the host application
/// uses. The returned list order is treated as authoritative by the
/// policies (round-robin cycles it, least-connections breaks ties by it),
/// and callers must not assume it is stable across fetches.
#[async_trait]
pub trait InstanceDirectory: Send + Sync {
    /// Fetch the current ordered instance list for a service name
    ///
    /// An unknown or fully drained service yields an empty list, not an
    /// error; the policies turn that into `NoInstanceAvailable`.
    async fn fetch_instances(&self, service: &str) -> BalancerResult<Vec<ServiceInstance>>;
}

/// In-memory instance directory
///
/// Useful for tests and for deployments with a statically known instance
/// set. The table can be mutated at runtime to simulate registry churn.
#[derive(Default)]
pub struct StaticInstanceDirectory {
    services: RwLock<HashMap<String, Vec<ServiceInstance>>>,
}

impl StaticInstanceDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the full instance list for a service
    pub fn set_instances<S: Into<String>>(&self, service: S, instances: Vec<ServiceInstance>) {
        let service = service.into();
        debug!(
            service = %service,
            count = instances.len(),
            "Updated instance list"
        );
        self.services.write().insert(service, instances);
    }

    /// Append a single instance to a service's list
    pub fn register_instance<S: Into<String>>(&self, service: S, instance: ServiceInstance) {
        let service = service.into();
        debug!(
            service = %service,
            instance = %instance,
            "Registered instance"
        );
        self.services.write().entry(service).or_default().push(instance);
    }

    /// Remove a single instance from a service's list
    pub fn remove_instance(&self, service: &str, instance: &ServiceInstance) {
        if let Some(instances) = self.services.write().get_mut(service) {
            instances.retain(|i| i != instance);
        }
    }
}

#[async_trait]
impl InstanceDirectory for StaticInstanceDirectory {
    async fn fetch_instances(&self, service: &str) -> BalancerResult<Vec<ServiceInstance>> {
        Ok(self
            .services
            .read()
            .get(service)
            .cloned()
            .unwrap_or_default())
    }
}
