//! Language detection.
//!
//! Unlike the other lookups, failures propagate: callers gate translation UI
//! on the answer, so no default language is ever guessed. Results are not
//! cached.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::OrchestratorConfig;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::FetchError;
use crate::transport::{Transport, TransportRequest};
use crate::types::Language;
use crate::validate;

pub struct LanguageDetector {
    transport: Arc<dyn Transport>,
    path: String,
    timeout: Duration,
    diagnostics: Arc<Diagnostics>,
}

impl LanguageDetector {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &OrchestratorConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            transport,
            path: config.endpoints.detect_language.clone(),
            timeout: config.request_timeout,
            diagnostics,
        }
    }

    /// Classify `text` as English or not.
    pub async fn detect(&self, text: &str) -> Result<Language, FetchError> {
        let request = TransportRequest::post(
            self.path.clone(),
            serde_json::json!({ "text": text }),
            self.timeout,
        );

        let outcome = match self.transport.execute(request).await {
            Ok(payload) => validate::language(&payload).map_err(FetchError::from),
            Err(error) => Err(FetchError::from(error)),
        };

        match &outcome {
            Ok(language) => debug!(language = language.as_str(), chars = text.chars().count(), "Language detected"),
            Err(error) => {
                self.diagnostics
                    .emit(DiagnosticKind::LanguageDetectionFailed {
                        kind: error.kind(),
                        error: error.to_string(),
                    })
                    .await;
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::transport::mock::{MockResponse, MockTransport};
    use serde_json::json;

    const PATH: &str = "/ai/detect-language";

    fn detector(transport: Arc<MockTransport>) -> (LanguageDetector, Arc<Diagnostics>) {
        let config = OrchestratorConfig::new("http://ai.test").unwrap();
        let diagnostics = Arc::new(Diagnostics::new());
        (
            LanguageDetector::new(transport, &config, Arc::clone(&diagnostics)),
            diagnostics,
        )
    }

    #[tokio::test]
    async fn test_detects_non_english() {
        let transport = Arc::new(
            MockTransport::new().with_response(PATH, MockResponse::Json(json!({ "language": "NON-EN" }))),
        );
        let (detector, _) = detector(Arc::clone(&transport));

        assert_eq!(detector.detect("bonjour").await, Ok(Language::NonEn));
        assert_eq!(
            transport.requests()[0].body,
            Some(json!({ "text": "bonjour" }))
        );
    }

    #[tokio::test]
    async fn test_unreachable_propagates() {
        let transport = Arc::new(MockTransport::new().with_response(PATH, MockResponse::Unreachable));
        let (detector, diagnostics) = detector(transport);

        let error = detector.detect("hello").await.unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Unreachable);
        assert_eq!(diagnostics.stats().await.detection_failures, 1);
    }

    #[tokio::test]
    async fn test_unknown_label_is_validation_error() {
        let transport = Arc::new(
            MockTransport::new().with_response(PATH, MockResponse::Json(json!({ "language": "fr" }))),
        );
        let (detector, _) = detector(transport);

        let error = detector.detect("salut").await.unwrap_err();
        assert!(error.is_validation());
    }

    #[tokio::test]
    async fn test_not_cached() {
        let transport = Arc::new(
            MockTransport::new().with_response(PATH, MockResponse::Json(json!({ "language": "EN" }))),
        );
        let (detector, _) = detector(Arc::clone(&transport));

        detector.detect("hi").await.unwrap();
        detector.detect("hi").await.unwrap();

        assert_eq!(transport.call_count(), 2);
    }
}
