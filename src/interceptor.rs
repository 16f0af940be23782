//! # Request Interceptor Module
//!
//! The single entry point the HTTP client pipeline invokes for every
//! outgoing call. Per request: policy lookup, instance selection,
//! connection accounting around the dispatch, and verbatim propagation of
//! the transport's result.
//!
//! ## Scoped Connection Accounting
//!
//! Counter bookkeeping must be symmetric under every exit path of the
//! dispatch: success, transport error, and cancellation of the in-flight
//! future. [`ConnectionGuard`] encodes that as RAII - the increment happens
//! when the guard is built, and `Drop` decrements exactly once no matter
//! how the enclosing scope unwinds.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use crate::balancing::counter::ConnectionCounter;
use crate::balancing::registry::PolicyRegistry;
use crate::core::error::BalancerResult;
use crate::core::types::{OutgoingRequest, ServiceInstance, UpstreamResponse};

/// Transport collaborator that actually sends the request
///
/// Timeouts, retries at the wire level, and response interpretation are
/// all the transport's concern; the interceptor re-surfaces whatever it
/// returns.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn dispatch(
        &self,
        request: &OutgoingRequest,
        instance: &ServiceInstance,
    ) -> BalancerResult<UpstreamResponse>;
}

/// RAII guard for one in-flight request against one instance
///
/// Increments the instance's count on acquisition and decrements it on
/// drop. Holding the guard across the dispatch await point guarantees the
/// decrement also runs if the future is cancelled mid-dispatch.
pub struct ConnectionGuard {
    counter: Arc<ConnectionCounter>,
    instance: ServiceInstance,
}

impl ConnectionGuard {
    pub fn acquire(counter: Arc<ConnectionCounter>, instance: &ServiceInstance) -> Self {
        counter.increment(instance);
        Self {
            counter,
            instance: instance.clone(),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.decrement(&self.instance);
    }
}

/// Orchestrates policy lookup, selection, accounting, and dispatch
pub struct RequestInterceptor {
    registry: Arc<PolicyRegistry>,
    counter: Arc<ConnectionCounter>,
    transport: Arc<dyn Transport>,
}

impl RequestInterceptor {
    /// Wire up an interceptor over explicitly constructed shared state
    ///
    /// The counter handle must be the same one the least-connections
    /// policies read, or their view of in-flight load goes stale.
    pub fn new(
        registry: Arc<PolicyRegistry>,
        counter: Arc<ConnectionCounter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            counter,
            transport,
        }
    }

    /// Intercept one outgoing request
    ///
    /// 1. Resolve the policy bound to the target service
    /// 2. Select an instance; an empty list aborts before any dispatch
    /// 3. If the policy tracks connections, acquire a [`ConnectionGuard`]
    /// 4. Dispatch through the transport collaborator
    /// 5. The guard's drop decrements on every exit path
    /// 6. Propagate the transport's result unchanged
    pub async fn intercept(&self, request: OutgoingRequest) -> BalancerResult<UpstreamResponse> {
        let policy = self.registry.resolve(&request.service)?;
        let instance = policy.select(&request.service).await?;

        let _guard = policy
            .tracks_connections()
            .then(|| ConnectionGuard::acquire(self.counter.clone(), &instance));

        debug!(
            request_id = %request.id,
            service = %request.service,
            instance = %instance,
            algorithm = policy.algorithm_name(),
            "Dispatching request"
        );

        self.transport.dispatch(&request, &instance).await
    }
}
