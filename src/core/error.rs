//! # Error Handling Module
//!
//! This module defines the error taxonomy for the balancing core using the
//! `thiserror` crate. Every fallible operation in the crate returns
//! [`BalancerResult`], and errors surface to the immediate caller of
//! `intercept`/`select` - nothing is swallowed except the intentionally
//! best-effort decrement-if-present in the connection counter.

use thiserror::Error;

/// Main result type used throughout the balancer
pub type BalancerResult<T> = Result<T, BalancerError>;

/// Error types for the balancing core
///
/// Each variant represents a different category of failure. The
/// `#[error("...")]` attribute from `thiserror` implements `Display` with
/// the given message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BalancerError {
    /// The instance list for a service was empty at selection time.
    /// A hard failure for that request attempt; never retried by the core.
    #[error("No instance available for service: {service}")]
    NoInstanceAvailable { service: String },

    /// A service name with no configured balancing policy. A configuration
    /// error; the operator must fix the policy binding.
    #[error("No balancing policy bound for service: {service}")]
    UnboundService { service: String },

    /// Failure reported by the dispatch collaborator (connection refused,
    /// timeout, ...). Re-surfaced without interpretation.
    #[error("Transport error for service {service}: {message}")]
    Transport { service: String, message: String },

    /// Configuration loading or validation errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl BalancerError {
    /// Create a no-instance-available error for a service
    pub fn no_instance<S: Into<String>>(service: S) -> Self {
        Self::NoInstanceAvailable {
            service: service.into(),
        }
    }

    /// Create an unbound-service error for a service
    pub fn unbound<S: Into<String>>(service: S) -> Self {
        Self::UnboundService {
            service: service.into(),
        }
    }

    /// Create a transport error with a custom message
    pub fn transport<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::Transport {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if this error should be retried by an outer layer
    ///
    /// The core never retries; this classification is for callers that do.
    /// Empty instance lists and transport failures are transient, while a
    /// missing policy binding will not fix itself.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NoInstanceAvailable { .. } => true,
            Self::Transport { .. } => true,
            Self::UnboundService { .. } => false,
            Self::Configuration { .. } => false,
        }
    }
}
