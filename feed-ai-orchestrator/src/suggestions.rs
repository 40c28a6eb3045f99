//! Suggestion aggregation.
//!
//! People and strategy suggestions come from different endpoints with
//! different item shapes, but callers see one contract: a `SuggestionSet`,
//! empty when the source failed. Results are deduplicated and kept for a
//! short TTL per `(source, user)`.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{EndpointPaths, OrchestratorConfig};
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::FetchError;
use crate::registry::{self, DedupRegistry, RegistryStats};
use crate::transport::{Transport, TransportRequest};
use crate::types::{
    PersonSuggestion, StrategySuggestion, SuggestionSet, SuggestionSource, Suggestions,
};
use crate::validate;

type SuggestionKey = (SuggestionSource, Option<String>);

/// Fetches, normalizes and caches suggestion lists.
pub struct SuggestionAggregator {
    transport: Arc<dyn Transport>,
    endpoints: EndpointPaths,
    timeout: Duration,
    registry: Arc<DedupRegistry<SuggestionKey, Suggestions, FetchError>>,
    diagnostics: Arc<Diagnostics>,
}

impl SuggestionAggregator {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &OrchestratorConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            transport,
            endpoints: config.endpoints.clone(),
            timeout: config.request_timeout,
            registry: Arc::new(DedupRegistry::new("suggestions", config.suggestion_ttl)),
            diagnostics,
        }
    }

    /// Suggestions from `source` for `user_id`. Never fails; failures are empty.
    ///
    /// People suggestions are per user, so without a user id no call is made.
    pub async fn get_suggestions(&self, source: SuggestionSource, user_id: Option<&str>) -> Suggestions {
        let user_id = normalize_user(user_id);

        if source == SuggestionSource::People && user_id.is_none() {
            self.diagnostics
                .emit(DiagnosticKind::SuggestionsSkipped {
                    source,
                    reason: "people suggestions need a user id".to_string(),
                })
                .await;
            return Suggestions::empty(source);
        }

        let path = match source {
            SuggestionSource::People => self.endpoints.people.clone(),
            SuggestionSource::Strategies => self.endpoints.strategies.clone(),
        };
        let mut request = TransportRequest::get(path, self.timeout);
        if let Some(user_id) = &user_id {
            request = request.with_query("userId", user_id.as_str());
        }

        let transport = Arc::clone(&self.transport);
        let diagnostics = Arc::clone(&self.diagnostics);
        let key = (source, user_id.clone());

        let outcome = self
            .registry
            .get_or_fetch(key, move || {
                fetch_suggestions(transport, request, source, user_id, diagnostics)
            })
            .await;

        outcome.unwrap_or_else(|_| Suggestions::empty(source))
    }

    /// People suggestions for a user.
    pub async fn people(&self, user_id: &str) -> SuggestionSet<PersonSuggestion> {
        match self.get_suggestions(SuggestionSource::People, Some(user_id)).await {
            Suggestions::People(set) => set,
            Suggestions::Strategies(_) => SuggestionSet::empty(),
        }
    }

    /// Strategy suggestions, personalized when a user is given.
    pub async fn strategies(&self, user_id: Option<&str>) -> SuggestionSet<StrategySuggestion> {
        match self.get_suggestions(SuggestionSource::Strategies, user_id).await {
            Suggestions::Strategies(set) => set,
            Suggestions::People(_) => SuggestionSet::empty(),
        }
    }

    /// Drop the cached set for `(source, user_id)`.
    pub fn invalidate(&self, source: SuggestionSource, user_id: Option<&str>) -> bool {
        self.registry.invalidate(&(source, normalize_user(user_id)))
    }

    pub fn clear(&self) {
        self.registry.clear();
    }

    pub fn purge_expired(&self) -> usize {
        self.registry.purge_expired()
    }

    /// Purge expired suggestion sets every `interval` in the background.
    pub fn spawn_purge_task(&self, interval: Duration) -> JoinHandle<()> {
        registry::spawn_purge_task(&self.registry, interval)
    }

    pub fn stats(&self) -> RegistryStats {
        self.registry.stats()
    }
}

/// Blank and padded user ids share the cache key of their trimmed form.
fn normalize_user(user_id: Option<&str>) -> Option<String> {
    user_id
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

async fn fetch_suggestions(
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    source: SuggestionSource,
    user_id: Option<String>,
    diagnostics: Arc<Diagnostics>,
) -> Result<Suggestions, FetchError> {
    let outcome = match transport.execute(request).await {
        Ok(payload) => {
            let validated = match source {
                SuggestionSource::People => validate::people(&payload).map(Suggestions::People),
                SuggestionSource::Strategies => {
                    validate::strategies(&payload).map(Suggestions::Strategies)
                }
            };
            validated.map_err(FetchError::from)
        }
        Err(error) => Err(FetchError::from(error)),
    };

    match &outcome {
        Ok(suggestions) => {
            debug!(
                source = source.as_str(),
                count = suggestions.len(),
                total = suggestions.total_results(),
                "Suggestions fetched"
            );
        }
        Err(error) => {
            diagnostics
                .emit(DiagnosticKind::SuggestionsFailed {
                    source,
                    user_id,
                    kind: error.kind(),
                    error: error.to_string(),
                })
                .await;
        }
    }

    outcome
}
