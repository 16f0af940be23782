//! # Client Balancer Library - Core Library Crate
//!
//! A client-side load balancing core: given a logical service name and a
//! dynamically changing set of backend instances, pick one instance per
//! outgoing request according to a pluggable per-service policy, while
//! tracking the in-flight request count each instance is carrying.
//!
//! ## Architecture Overview
//!
//! The crate is organized around three collaborator traits that the host
//! application implements (or wires up from the bundled implementations):
//!
//! - [`InstanceDirectory`](discovery::InstanceDirectory) - produces the
//!   current instance list for a service name, backed by whatever service
//!   registry the host application uses
//! - [`PolicyBinder`](balancing::registry::PolicyBinder) - maps a service
//!   name to the balancing policy configured for it
//! - [`Transport`](interceptor::Transport) - actually dispatches a request
//!   to a chosen instance and returns the response or failure
//!
//! Everything else is in-process state: the connection counter, the policy
//! cache, and the round-robin cursors are constructed once at startup and
//! shared by `Arc` handle, so tests can build isolated copies instead of
//! relying on ambient singletons.

/// Core functionality: error types, configuration, and basic data structures
/// used throughout the balancer
pub mod core;

/// Instance directory abstraction over the external service registry,
/// plus an in-memory implementation for tests and static wiring
pub mod discovery;

/// Balancing policies (round-robin, random, least-connections), the
/// connection counter, and the per-service policy registry
pub mod balancing;

/// The request interceptor: policy lookup, instance selection, and
/// symmetric connection accounting around every dispatch
pub mod interceptor;

/// Structured logging initialization helpers
pub mod observability;

// Re-export the types most callers need directly from the crate root.
pub use crate::balancing::counter::ConnectionCounter;
pub use crate::balancing::policies::{
    BalancingPolicy, InstanceStats, LeastConnectionsPolicy, PolicyStats, RandomPolicy,
    RoundRobinPolicy,
};
pub use crate::balancing::registry::{ConfigPolicyBinder, PolicyBinder, PolicyRegistry};
pub use crate::core::config::{BalancingConfig, PolicyKind};
pub use crate::core::error::{BalancerError, BalancerResult};
pub use crate::core::types::{OutgoingRequest, ServiceInstance, UpstreamResponse};
pub use crate::discovery::{InstanceDirectory, StaticInstanceDirectory};
pub use crate::interceptor::{ConnectionGuard, RequestInterceptor, Transport};
