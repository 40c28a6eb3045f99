//! Post-insight lookup.
//!
//! Insights are advisory annotations; their absence must never block a post
//! from rendering, so every failure collapses to `None` for the caller while
//! the diagnostic channel records which failure it was.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{EndpointPaths, OrchestratorConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::FetchError;
use crate::registry::{self, DedupRegistry, RegistryStats};
use crate::transport::{Transport, TransportRequest};
use crate::types::{Insight, InsightRequestKey};
use crate::validate;

/// Deduplicated, briefly cached post-insight lookups.
pub struct InsightLookup {
    transport: Arc<dyn Transport>,
    endpoints: EndpointPaths,
    timeout: Duration,
    registry: Arc<DedupRegistry<InsightRequestKey, Option<Insight>, FetchError>>,
    diagnostics: Arc<Diagnostics>,
}

impl InsightLookup {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &OrchestratorConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            transport,
            endpoints: config.endpoints.clone(),
            timeout: config.request_timeout,
            registry: Arc::new(DedupRegistry::new("insight", config.insight_ttl)),
            diagnostics,
        }
    }

    /// Get the insight for a post, or `None` if there is none or it failed.
    pub async fn get_insight(&self, user_id: &str, post_id: &str) -> Option<Insight> {
        let key = InsightRequestKey::new(user_id, post_id);

        let transport = Arc::clone(&self.transport);
        let diagnostics = Arc::clone(&self.diagnostics);
        let request = TransportRequest::get(self.endpoints.insight_for(post_id), self.timeout)
            .with_query("userId", user_id);
        let fetch_key = key.clone();

        let outcome = self
            .registry
            .get_or_fetch(key, move || fetch_insight(transport, request, fetch_key, diagnostics))
            .await;

        outcome.ok().flatten()
    }

    /// Drop any cached insight for the post, e.g. after it was edited.
    pub fn invalidate(&self, user_id: &str, post_id: &str) -> bool {
        self.registry.invalidate(&InsightRequestKey::new(user_id, post_id))
    }

    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Remove expired insights. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        self.registry.purge_expired()
    }

    /// Purge expired insights every `interval` in the background.
    pub fn spawn_purge_task(&self, interval: Duration) -> JoinHandle<()> {
        registry::spawn_purge_task(&self.registry, interval)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

/// One network round-trip; diagnostics are emitted once per call, not per
/// joined caller.
async fn fetch_insight(
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    key: InsightRequestKey,
    diagnostics: Arc<Diagnostics>,
) -> Result<Option<Insight>, FetchError> {
    let payload = match transport.execute(request).await {
        Ok(payload) => payload,
        Err(error) => {
            diagnostics
                .emit(DiagnosticKind::InsightUnavailable {
                    user_id: key.user_id.clone(),
                    post_id: key.post_id.clone(),
                    error: error.to_string(),
                })
                .await;
            return Err(error.into());
        }
    };

    match validate::insight(&payload) {
        Ok(Some(insight)) => {
            debug!(user_id = %key.user_id, post_id = %key.post_id, sentiment = ?insight.sentiment, "Insight fetched");
            Ok(Some(insight))
        }
        Ok(None) => {
            diagnostics.emit(missing(&key)).await;
            Ok(None)
        }
        Err(error) => {
            diagnostics
                .emit(DiagnosticKind::InsightMalformed {
                    user_id: key.user_id.clone(),
                    post_id: key.post_id.clone(),
                    error: error.to_string(),
                })
                .await;
            Err(error.into())
        }
    }
}

fn missing(key: &InsightRequestKey) -> DiagnosticKind {
    DiagnosticKind::InsightMissing {
        user_id: key.user_id.clone(),
        post_id: key.post_id.clone(),
    }
}
