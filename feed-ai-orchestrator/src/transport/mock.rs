//! Mock transport for testing.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::traits::*;

/// Scripted outcome for one call.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// 200 with a JSON body
    Json(serde_json::Value),
    /// 200 with an arbitrary body
    Raw(String),
    /// Non-success status
    Status(u16),
    /// Network failure
    Unreachable,
}

impl MockResponse {
    fn into_result(self) -> Result<RawPayload, TransportError> {
        match self {
            Self::Json(value) => Ok(RawPayload::json(&value)),
            Self::Raw(body) => Ok(RawPayload::new(200, body)),
            Self::Status(code) => Err(TransportError::HttpStatus { code }),
            Self::Unreachable => Err(TransportError::Unreachable(
                "mock backend unreachable".to_string(),
            )),
        }
    }
}

#[derive(Default)]
struct PathScript {
    queued: VecDeque<MockResponse>,
    fallback: Option<MockResponse>,
}

/// Mock transport for testing.
///
/// Responses are scripted per path. Queued responses are consumed first,
/// then the path's standing response repeats. Unscripted paths answer 404.
pub struct MockTransport {
    scripts: DashMap<String, PathScript>,
    delay: Duration,
    call_count: AtomicU32,
    requests: Mutex<Vec<TransportRequest>>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self {
            scripts: DashMap::new(),
            delay: Duration::ZERO,
            call_count: AtomicU32::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Set the standing response for a path.
    pub fn with_response(self, path: impl Into<String>, response: MockResponse) -> Self {
        self.respond(path, response);
        self
    }

    /// Delay every response, e.g. to hold calls in flight.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Replace the standing response for a path.
    pub fn respond(&self, path: impl Into<String>, response: MockResponse) {
        self.scripts.entry(path.into()).or_default().fallback = Some(response);
    }

    /// Queue a one-shot response for a path.
    pub fn enqueue(&self, path: impl Into<String>, response: MockResponse) {
        self.scripts
            .entry(path.into())
            .or_default()
            .queued
            .push_back(response);
    }

    /// Get the number of times execute was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of calls made to one path.
    pub fn calls_to(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }

    /// All requests seen so far, oldest first.
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    /// Reset the call count and request log.
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.clear();
        }
    }

    fn next_response(&self, path: &str) -> MockResponse {
        match self.scripts.get_mut(path) {
            Some(mut script) => match script.queued.pop_front() {
                Some(response) => response,
                None => script
                    .fallback
                    .clone()
                    .unwrap_or(MockResponse::Status(404)),
            },
            None => MockResponse::Status(404),
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: TransportRequest) -> Result<RawPayload, TransportError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let response = self.next_response(&request.path);
        let delay = self.delay;

        let outcome = async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            response.into_result()
        };

        match tokio::time::timeout(request.timeout, outcome).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(request.timeout)),
        }
    }
}
