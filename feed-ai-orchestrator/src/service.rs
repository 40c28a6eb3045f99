//! AiOrchestrator - the single entry point UI surfaces call.
//!
//! Routes each request to its subsystem and shapes the outcome into one
//! envelope: `{ok: true, value}` or `{ok: false, kind, message}`. Degradation
//! policy lives in the subsystems; the facade only routes and shapes.

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chat::{ChatError, ChatSessionManager, SessionState};
use crate::config::OrchestratorConfig;
use crate::diagnostics::{DiagnosticEvent, Diagnostics};
use crate::error::{ErrorKind, FetchError};
use crate::insight::InsightLookup;
use crate::language::LanguageDetector;
use crate::registry::RegistryStats;
use crate::stream::TranscriptStream;
use crate::suggestions::SuggestionAggregator;
use crate::transport::{HttpTransport, Transport};
use crate::types::{ChatTurn, Insight, Language, Query, SessionId, SuggestionSource, Suggestions};

/// Error types for the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// HTTP client could not be built
    #[error("Failed to build HTTP transport: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Uniform result handed to UI callers.
///
/// On the wire the `ok` flag selects the variant, so a failure never parses
/// as a success even when `T` accepts a missing value.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
    Success { value: T },
    Failure { kind: ErrorKind, message: String },
}

#[derive(Serialize)]
struct EnvelopeOut<'a, T> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<&'a T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

#[derive(Deserialize)]
struct EnvelopeIn {
    ok: bool,
    #[serde(default)]
    value: serde_json::Value,
    #[serde(default)]
    kind: Option<ErrorKind>,
    #[serde(default)]
    message: Option<String>,
}

impl<T: Serialize> Serialize for Envelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            Self::Success { value } => EnvelopeOut {
                ok: true,
                value: Some(value),
                kind: None,
                message: None,
            },
            Self::Failure { kind, message } => EnvelopeOut {
                ok: false,
                value: None,
                kind: Some(*kind),
                message: Some(message.as_str()),
            },
        };
        wire.serialize(serializer)
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = EnvelopeIn::deserialize(deserializer)?;
        if wire.ok {
            let value = serde_json::from_value(wire.value).map_err(de::Error::custom)?;
            return Ok(Self::Success { value });
        }

        let kind = wire.kind.ok_or_else(|| de::Error::missing_field("kind"))?;
        let message = wire.message.ok_or_else(|| de::Error::missing_field("message"))?;
        Ok(Self::Failure { kind, message })
    }
}

/// A failed envelope as an error value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct EnvelopeError {
    pub kind: ErrorKind,
    pub message: String,
}

impl<T> Envelope<T> {
    pub fn success(value: T) -> Self {
        Self::Success { value }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The failure kind, if this is a failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn into_result(self) -> Result<T, EnvelopeError> {
        match self {
            Self::Success { value } => Ok(value),
            Self::Failure { kind, message } => Err(EnvelopeError { kind, message }),
        }
    }
}

impl<T> From<Result<T, FetchError>> for Envelope<T> {
    fn from(result: Result<T, FetchError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => Self::failure(error.kind(), error.to_string()),
        }
    }
}

impl<T> From<Result<T, ChatError>> for Envelope<T> {
    fn from(result: Result<T, ChatError>) -> Self {
        match result {
            Ok(value) => Self::success(value),
            Err(error) => Self::failure(error.kind(), error.to_string()),
        }
    }
}

/// Main entry point for AI interactions.
pub struct AiOrchestrator {
    /// Configuration
    config: OrchestratorConfig,
    /// Chat sessions, one per surface
    chat: ChatSessionManager,
    /// People and strategy suggestions
    suggestions: SuggestionAggregator,
    /// Post insights
    insight: InsightLookup,
    /// Language detection
    language: LanguageDetector,
    /// Diagnostic channel shared by every subsystem
    diagnostics: Arc<Diagnostics>,
}

impl AiOrchestrator {
    /// Create an orchestrator over an existing transport.
    pub fn new(config: OrchestratorConfig, transport: Arc<dyn Transport>) -> Self {
        let diagnostics = Arc::new(Diagnostics::with_capacity(config.diagnostics_capacity));

        info!(base_url = %config.base_url, "Creating AiOrchestrator");

        Self {
            chat: ChatSessionManager::new(Arc::clone(&transport), &config, Arc::clone(&diagnostics)),
            suggestions: SuggestionAggregator::new(
                Arc::clone(&transport),
                &config,
                Arc::clone(&diagnostics),
            ),
            insight: InsightLookup::new(Arc::clone(&transport), &config, Arc::clone(&diagnostics)),
            language: LanguageDetector::new(transport, &config, Arc::clone(&diagnostics)),
            diagnostics,
            config,
        }
    }

    /// Create an orchestrator talking HTTP to the configured base URL.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self, ServiceError> {
        let transport = HttpTransport::new(config.base_url.clone())?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    // ========================================================================
    // Core operations
    // ========================================================================

    /// Submit a chat query on a session and wait for the assistant's turn.
    pub async fn submit_query(&self, session_id: &SessionId, query: Query) -> Envelope<ChatTurn> {
        debug!(%session_id, "submit_query");
        self.chat.submit(session_id, query).await.into()
    }

    /// Insight for a post; `value` is null when there is none.
    pub async fn get_insight(&self, user_id: &str, post_id: &str) -> Envelope<Option<Insight>> {
        Envelope::success(self.insight.get_insight(user_id, post_id).await)
    }

    /// Suggestions from one source; failures come back as an empty set.
    pub async fn get_suggestions(
        &self,
        source: SuggestionSource,
        user_id: Option<&str>,
    ) -> Envelope<Suggestions> {
        Envelope::success(self.suggestions.get_suggestions(source, user_id).await)
    }

    /// Detect the language of `text`. Failures are reported, never guessed.
    pub async fn detect_language(&self, text: &str) -> Envelope<Language> {
        self.language.detect(text).await.into()
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    pub async fn transcript(&self, session_id: &SessionId) -> Vec<ChatTurn> {
        self.chat.transcript(session_id).await
    }

    pub async fn session_state(&self, session_id: &SessionId) -> SessionState {
        self.chat.state(session_id).await
    }

    pub async fn stream_transcript(&self, session_id: &SessionId) -> TranscriptStream {
        self.chat.stream(session_id).await
    }

    /// Start the session over. Any reply still in flight is discarded.
    pub async fn reset_session(&self, session_id: &SessionId) {
        self.chat.reset(session_id).await;
    }

    /// Tear the session down when its surface is dismissed.
    pub async fn dismiss_session(&self, session_id: &SessionId) -> bool {
        self.chat.dismiss(session_id).await
    }

    // ========================================================================
    // Caches
    // ========================================================================

    pub fn invalidate_insight(&self, user_id: &str, post_id: &str) -> bool {
        self.insight.invalidate(user_id, post_id)
    }

    pub fn invalidate_suggestions(&self, source: SuggestionSource, user_id: Option<&str>) -> bool {
        self.suggestions.invalidate(source, user_id)
    }

    pub fn clear_caches(&self) {
        self.insight.clear();
        self.suggestions.clear();
    }

    /// Remove expired insights and suggestion sets now.
    pub fn purge_expired_caches(&self) -> usize {
        self.insight.purge_expired() + self.suggestions.purge_expired()
    }

    /// Purge both caches every `interval` until the handles are aborted or
    /// the orchestrator is dropped.
    pub fn spawn_cache_purge(&self, interval: Duration) -> Vec<JoinHandle<()>> {
        vec![
            self.insight.spawn_purge_task(interval),
            self.suggestions.spawn_purge_task(interval),
        ]
    }

    pub fn insight_stats(&self) -> RegistryStats {
        self.insight.stats()
    }

    pub fn suggestion_stats(&self) -> RegistryStats {
        self.suggestions.stats()
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.diagnostics.subscribe()
    }

    /// Get recent diagnostic events, newest first.
    pub async fn recent_diagnostics(&self, limit: usize) -> Vec<DiagnosticEvent> {
        self.diagnostics.recent(limit).await
    }

    pub fn diagnostics(&self) -> &Arc<Diagnostics> {
        &self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::transport::mock::{MockResponse, MockTransport};
    use crate::types::Sentiment;
    use serde_json::json;

    fn orchestrator(transport: Arc<MockTransport>) -> AiOrchestrator {
        let config = OrchestratorConfig::new("http://ai.test")
            .unwrap()
            .with_request_timeout(Duration::from_secs(1))
            .with_chat_timeout(Duration::from_secs(1));
        AiOrchestrator::new(config, transport)
    }

    #[test]
    fn test_envelope_wire_shape() {
        let ok = serde_json::to_value(Envelope::success(Language::En)).unwrap();
        assert_eq!(ok, json!({ "ok": true, "value": "EN" }));

        let failed: Envelope<Language> = Envelope::failure(ErrorKind::Unreachable, "timed out");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({ "ok": false, "kind": "unreachable", "message": "timed out" })
        );
    }

    #[test]
    fn test_envelope_round_trips_through_json() {
        let parsed: Envelope<Language> =
            serde_json::from_value(json!({ "ok": false, "kind": "invalid_state", "message": "busy" }))
                .unwrap();
        assert_eq!(parsed.kind(), Some(ErrorKind::InvalidState));

        let error = parsed.into_result().unwrap_err();
        assert_eq!(error.message, "busy");

        let failed: Envelope<Option<Insight>> = Envelope::failure(ErrorKind::Unreachable, "down");
        let parsed: Envelope<Option<Insight>> =
            serde_json::from_value(serde_json::to_value(&failed).unwrap()).unwrap();
        assert!(!parsed.is_ok());
        assert_eq!(parsed, failed);

        let absent: Envelope<Option<Insight>> = Envelope::success(None);
        let parsed: Envelope<Option<Insight>> =
            serde_json::from_value(serde_json::to_value(&absent).unwrap()).unwrap();
        assert_eq!(parsed, absent);

        let present = Envelope::success(Some(Insight {
            sentiment: Sentiment::Mixed,
            summary: None,
        }));
        let parsed: Envelope<Option<Insight>> =
            serde_json::from_value(serde_json::to_value(&present).unwrap()).unwrap();
        assert_eq!(parsed, present);
    }

    #[test]
    fn test_envelope_ok_flag_is_authoritative() {
        let parsed: Envelope<Option<Insight>> = serde_json::from_value(
            json!({ "ok": false, "kind": "http_status", "message": "HTTP 503", "value": null }),
        )
        .unwrap();
        assert_eq!(parsed.kind(), Some(ErrorKind::HttpStatus));

        let missing_kind =
            serde_json::from_value::<Envelope<Option<Insight>>>(json!({ "ok": false, "message": "x" }));
        assert!(missing_kind.is_err());

        let missing_flag =
            serde_json::from_value::<Envelope<Option<Insight>>>(json!({ "value": null }));
        assert!(missing_flag.is_err());
    }

    #[tokio::test]
    async fn test_routes_each_operation() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response("/ai/query", MockResponse::Json(json!({ "answer": "Hi there" })))
                .with_response(
                    "/ai/detect-language",
                    MockResponse::Json(json!({ "language": "EN" })),
                )
                .with_response(
                    "/ai/posts/p1/insight",
                    MockResponse::Json(json!({ "insight": { "sentiment": "positive" } })),
                )
                .with_response(
                    "/ai/suggestions/strategies",
                    MockResponse::Json(json!({ "suggestions": [{ "id": "s1", "name": "Breakout" }] })),
                ),
        );
        let ai = orchestrator(Arc::clone(&transport));
        let session = SessionId::new("home");

        let turn = ai.submit_query(&session, Query::new("Hello")).await.into_result().unwrap();
        assert_eq!(turn.text, "Hi there");

        let language = ai.detect_language("hello").await.into_result().unwrap();
        assert_eq!(language, Language::En);

        let insight = ai.get_insight("u1", "p1").await.into_result().unwrap();
        assert_eq!(insight.unwrap().sentiment, Sentiment::Positive);

        let suggestions = ai
            .get_suggestions(SuggestionSource::Strategies, None)
            .await
            .into_result()
            .unwrap();
        assert_eq!(suggestions.len(), 1);

        assert_eq!(transport.call_count(), 4);
    }

    #[tokio::test]
    async fn test_degraded_paths_are_still_ok() {
        let transport = Arc::new(MockTransport::new());
        let ai = orchestrator(transport);

        let insight = ai.get_insight("u1", "p1").await;
        assert_eq!(insight, Envelope::success(None));

        let suggestions = ai.get_suggestions(SuggestionSource::People, Some("u1")).await;
        assert_eq!(
            suggestions,
            Envelope::success(Suggestions::empty(SuggestionSource::People))
        );

        let detect = ai.detect_language("hola").await;
        assert_eq!(detect.kind(), Some(ErrorKind::HttpStatus));
    }

    #[tokio::test]
    async fn test_double_submit_is_invalid_state_envelope() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response("/ai/query", MockResponse::Json(json!({ "answer": "ok" })))
                .with_delay(Duration::from_millis(80)),
        );
        let ai = Arc::new(orchestrator(transport));
        let session = SessionId::new("s1");

        let first = {
            let ai = Arc::clone(&ai);
            let session = session.clone();
            tokio::spawn(async move { ai.submit_query(&session, Query::new("one")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = ai.submit_query(&session, Query::new("two")).await;
        assert_eq!(second.kind(), Some(ErrorKind::InvalidState));

        assert!(first.await.unwrap().is_ok());
        assert_eq!(ai.transcript(&session).await.len(), 2);
    }

    #[tokio::test]
    async fn test_diagnostics_subscription() {
        let transport = Arc::new(
            MockTransport::new().with_response("/ai/posts/p1/insight", MockResponse::Unreachable),
        );
        let ai = orchestrator(transport);
        let mut events = ai.subscribe_diagnostics();

        ai.get_insight("u1", "p1").await;

        let event = events.recv().await.unwrap();
        assert!(matches!(event.kind, DiagnosticKind::InsightUnavailable { .. }));
        assert_eq!(ai.recent_diagnostics(10).await.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_caches() {
        let transport = Arc::new(MockTransport::new().with_response(
            "/ai/posts/p1/insight",
            MockResponse::Json(json!({ "insight": { "sentiment": "neutral" } })),
        ));
        let ai = orchestrator(Arc::clone(&transport));

        ai.get_insight("u1", "p1").await;
        ai.get_insight("u1", "p1").await;
        assert_eq!(transport.call_count(), 1);
        assert_eq!(ai.insight_stats().hits, 1);

        ai.clear_caches();
        ai.get_insight("u1", "p1").await;
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_purge_drops_expired_entries() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(
                    "/ai/posts/p1/insight",
                    MockResponse::Json(json!({ "insight": { "sentiment": "neutral" } })),
                )
                .with_response(
                    "/ai/suggestions/strategies",
                    MockResponse::Json(json!({ "suggestions": [{ "id": "s1", "name": "Breakout" }] })),
                ),
        );
        let config = OrchestratorConfig::new("http://ai.test")
            .unwrap()
            .with_insight_ttl(Duration::from_millis(20))
            .with_suggestion_ttl(Duration::from_millis(20));
        let ai = AiOrchestrator::new(config, transport);

        ai.get_insight("u1", "p1").await;
        ai.get_suggestions(SuggestionSource::Strategies, None).await;
        assert_eq!(ai.insight_stats().entries + ai.suggestion_stats().entries, 2);

        let tasks = ai.spawn_cache_purge(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(ai.insight_stats().entries, 0);
        assert_eq!(ai.suggestion_stats().entries, 0);
        assert_eq!(ai.purge_expired_caches(), 0);
        for task in tasks {
            task.abort();
        }
    }
}
