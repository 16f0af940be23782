//! # Configuration Module
//!
//! Policy-binding configuration: which named service uses which balancing
//! policy. The binding itself is external configuration; this module only
//! parses and validates it.
//!
//! ## Key Features
//! - YAML/JSON parsing with serde
//! - Unknown policy names rejected at parse time
//! - Validation with detailed error messages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::core::error::{BalancerError, BalancerResult};

/// The balancing policy kinds this crate implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    /// Deterministic cyclic order over the instance list
    RoundRobin,
    /// Uniform random choice per call, no state across calls
    Random,
    /// Route to the instance with the fewest in-flight requests
    LeastConnections,
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyKind::RoundRobin => write!(f, "round_robin"),
            PolicyKind::Random => write!(f, "random"),
            PolicyKind::LeastConnections => write!(f, "least_connections"),
        }
    }
}

/// Service-to-policy binding configuration
///
/// ```yaml
/// services:
///   service-a: round_robin
///   service-b: random
///   service-c: least_connections
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalancingConfig {
    /// Map from logical service name to the policy bound to it
    #[serde(default)]
    pub services: HashMap<String, PolicyKind>,
}

impl BalancingConfig {
    /// Load configuration from a YAML file
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> BalancerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BalancerError::config(format!("Failed to read config file: {}", e)))?;

        let config: BalancingConfig = serde_yaml::from_str(&content)
            .map_err(|e| BalancerError::config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a JSON file
    pub async fn load_from_json<P: AsRef<Path>>(path: P) -> BalancerResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| BalancerError::config(format!("Failed to read config file: {}", e)))?;

        let config: BalancingConfig = serde_json::from_str(&content)
            .map_err(|e| BalancerError::config(format!("Failed to parse JSON config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from an explicit binding list
    pub fn from_bindings<S: Into<String>, I: IntoIterator<Item = (S, PolicyKind)>>(
        bindings: I,
    ) -> Self {
        Self {
            services: bindings
                .into_iter()
                .map(|(name, kind)| (name.into(), kind))
                .collect(),
        }
    }

    /// Look up the policy kind bound to a service name
    pub fn policy_for(&self, service: &str) -> Option<PolicyKind> {
        self.services.get(service).copied()
    }

    /// Validate the configuration
    pub fn validate(&self) -> BalancerResult<()> {
        for name in self.services.keys() {
            if name.trim().is_empty() {
                return Err(BalancerError::config(
                    "Service names in policy bindings must not be empty",
                ));
            }
        }
        Ok(())
    }
}
