//! # Core Types Module
//!
//! This module defines the foundational data structures used throughout the
//! balancer: the service instance returned by the directory, and the
//! request/response pair carried through the interceptor.
//!
//! ## Rust Ownership Concepts in This Module
//!
//! - `ServiceInstance` is an immutable value: once a directory fetch returns
//!   it, nothing mutates it - it is only read and used to derive a map key
//! - Request bodies use `bytes::Bytes` so cloning a request does not copy
//!   the payload
//! - `Clone` everywhere keeps the types cheap to hand across task boundaries

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// A single backend instance of a logical service
///
/// Identity is the `(host, port)` pair; metadata is opaque registry payload
/// carried along for the caller's benefit. Instances are never mutated after
/// a directory fetch returns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Hostname or IP address of the instance
    pub host: String,

    /// Port the instance listens on
    pub port: u16,

    /// Registry-provided metadata (zone, version, ...)
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// Create a new instance with empty metadata
    pub fn new<S: Into<String>>(host: S, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            metadata: HashMap::new(),
        }
    }

    /// Stable addressing key for this instance
    ///
    /// Used as the key into the connection counter; unique per distinct
    /// instance and stable across repeated directory fetches.
    pub fn instance_key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL for dispatching requests to this instance
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// An outgoing request destined for a named service
///
/// This is the client-side request shape the interceptor works with before
/// an instance has been chosen: it carries the logical service name, not a
/// resolved address.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// Unique identifier for this request (for tracing and logging)
    pub id: String,

    /// Logical name of the target service
    pub service: String,

    /// HTTP method
    pub method: Method,

    /// Request path including query parameters
    pub path: String,

    /// Request headers
    pub headers: HeaderMap,

    /// Request body
    pub body: Bytes,
}

impl OutgoingRequest {
    /// Create a new request with a generated ID and empty body
    pub fn new<S: Into<String>, P: Into<String>>(service: S, method: Method, path: P) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service: service.into(),
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Attach a body to the request
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Get a header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// A response returned by the transport collaborator
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    /// HTTP status code
    pub status: StatusCode,

    /// Response headers
    pub headers: HeaderMap,

    /// Response body
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Create a response with the given status and empty body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Attach a body to the response
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Check whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
