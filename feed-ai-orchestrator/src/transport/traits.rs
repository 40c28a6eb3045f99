//! Core traits for backend transports.
//!
//! This module defines the `Transport` trait - the single seam through which
//! every AI endpoint call leaves the process.

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// Error types for transport operations.
///
/// Cloneable so one in-flight outcome can be handed to every joined caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network failure or timeout
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// Backend answered with a non-success status
    #[error("Backend returned HTTP {code}")]
    HttpStatus { code: u16 },
}

impl TransportError {
    /// Timed out waiting for the backend.
    pub fn timeout(timeout: Duration) -> Self {
        Self::Unreachable(format!("timed out after {}ms", timeout.as_millis()))
    }
}

/// HTTP method of a backend call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// One call to a backend endpoint.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Path relative to the configured base URL
    pub path: String,
    /// Query string parameters
    pub query: Vec<(String, String)>,
    /// JSON body (POST only)
    pub body: Option<serde_json::Value>,
    /// Upper bound for the whole call, body included
    pub timeout: Duration,
}

impl TransportRequest {
    /// Create a GET request.
    pub fn get(path: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    /// Create a POST request with a JSON body.
    pub fn post(path: impl Into<String>, body: serde_json::Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            query: Vec::new(),
            body: Some(body),
            timeout,
        }
    }

    /// Add a query string parameter.
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }
}

/// Successful response body, not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload {
    pub status: u16,
    pub body: Bytes,
}

impl RawPayload {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A 200 response carrying the given JSON.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::new(200, value.to_string())
    }
}

/// Core trait for backend transports.
///
/// Implementations perform no retries and must resolve within
/// `request.timeout`, reporting expiry as `TransportError::Unreachable`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request.
    async fn execute(&self, request: TransportRequest) -> Result<RawPayload, TransportError>;
}
