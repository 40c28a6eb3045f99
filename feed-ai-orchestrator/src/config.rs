//! Configuration for the orchestration layer.
//!
//! The AI backend base URL is the one required value; without it every call
//! would be meaningless, so construction fails immediately. Everything else
//! has a documented default.

use reqwest::Url;
use std::time::Duration;

/// Environment variable holding the backend base URL.
pub const BASE_URL_ENV: &str = "AI_BASE_URL";

/// Default timeout for insight, suggestion, and detection calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Default timeout for chat queries.
pub const DEFAULT_CHAT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default lifetime of a cached insight.
pub const DEFAULT_INSIGHT_TTL: Duration = Duration::from_secs(30);
/// Default lifetime of a cached suggestion set.
pub const DEFAULT_SUGGESTION_TTL: Duration = Duration::from_secs(30);

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("AI_BASE_URL is not set")]
    MissingBaseUrl,

    #[error("Invalid base URL {url:?}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

/// Paths of the five AI endpoints, relative to the base URL.
///
/// `{postId}` in `insight` is replaced with the (URL-encoded) post id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointPaths {
    pub chat: String,
    pub detect_language: String,
    pub insight: String,
    pub people: String,
    pub strategies: String,
}

impl Default for EndpointPaths {
    fn default() -> Self {
        Self {
            chat: "/ai/query".to_string(),
            detect_language: "/ai/detect-language".to_string(),
            insight: "/ai/posts/{postId}/insight".to_string(),
            people: "/ai/suggestions/people".to_string(),
            strategies: "/ai/suggestions/strategies".to_string(),
        }
    }
}

impl EndpointPaths {
    /// Insight path for one post.
    pub fn insight_for(&self, post_id: &str) -> String {
        self.insight
            .replace("{postId}", &urlencoding::encode(post_id))
    }
}

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Base URL shared by every AI endpoint
    pub base_url: Url,
    /// Timeout for insight, suggestion and detection calls
    pub request_timeout: Duration,
    /// Timeout for chat queries
    pub chat_timeout: Duration,
    /// How long a successful insight is reused
    pub insight_ttl: Duration,
    /// How long a successful suggestion set is reused
    pub suggestion_ttl: Duration,
    /// Events retained by the diagnostic log
    pub diagnostics_capacity: usize,
    /// Endpoint paths
    pub endpoints: EndpointPaths,
}

impl OrchestratorConfig {
    /// Create with defaults for everything but the base URL.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }

        let base_url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl {
            url: trimmed.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: trimmed.to_string(),
                reason: "scheme must be http or https".to_string(),
            });
        }

        Ok(Self {
            base_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            chat_timeout: DEFAULT_CHAT_TIMEOUT,
            insight_ttl: DEFAULT_INSIGHT_TTL,
            suggestion_ttl: DEFAULT_SUGGESTION_TTL,
            diagnostics_capacity: crate::diagnostics::DEFAULT_CAPACITY,
            endpoints: EndpointPaths::default(),
        })
    }

    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any name → value source (environment, CLI, tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(BASE_URL_ENV).ok_or(ConfigError::MissingBaseUrl)?;
        let mut config = Self::new(&base_url)?;

        if let Some(ms) = parse_var::<u64, _>(&lookup, "AI_REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "AI_CHAT_TIMEOUT_MS")? {
            config.chat_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AI_INSIGHT_TTL_SECS")? {
            config.insight_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "AI_SUGGESTION_TTL_SECS")? {
            config.suggestion_ttl = Duration::from_secs(secs);
        }
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "AI_DIAGNOSTICS_CAPACITY")? {
            config.diagnostics_capacity = capacity;
        }

        Ok(config)
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_chat_timeout(mut self, timeout: Duration) -> Self {
        self.chat_timeout = timeout;
        self
    }

    pub fn with_insight_ttl(mut self, ttl: Duration) -> Self {
        self.insight_ttl = ttl;
        self
    }

    pub fn with_suggestion_ttl(mut self, ttl: Duration) -> Self {
        self.suggestion_ttl = ttl;
        self
    }

    pub fn with_diagnostics_capacity(mut self, capacity: usize) -> Self {
        self.diagnostics_capacity = capacity;
        self
    }

    pub fn with_endpoints(mut self, endpoints: EndpointPaths) -> Self {
        self.endpoints = endpoints;
        self
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { name, value }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_missing_base_url_fails() {
        let result = OrchestratorConfig::from_lookup(lookup(&[]));
        assert!(matches!(result, Err(ConfigError::MissingBaseUrl)));

        let result = OrchestratorConfig::from_lookup(lookup(&[(BASE_URL_ENV, "  ")]));
        assert!(matches!(result, Err(ConfigError::MissingBaseUrl)));
    }

    #[test]
    fn test_invalid_base_url_fails() {
        let result = OrchestratorConfig::new("not a url");
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));

        let result = OrchestratorConfig::new("ftp://files.example.com");
        assert!(matches!(result, Err(ConfigError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::from_lookup(lookup(&[(
            BASE_URL_ENV,
            "https://ai.feed.example.com",
        )]))
        .unwrap();

        assert_eq!(config.request_timeout, DEFAULT_REQUEST_TIMEOUT);
        assert_eq!(config.chat_timeout, DEFAULT_CHAT_TIMEOUT);
        assert_eq!(config.insight_ttl, DEFAULT_INSIGHT_TTL);
        assert_eq!(config.endpoints, EndpointPaths::default());
    }

    #[test]
    fn test_overrides() {
        let config = OrchestratorConfig::from_lookup(lookup(&[
            (BASE_URL_ENV, "http://localhost:8000"),
            ("AI_REQUEST_TIMEOUT_MS", "2500"),
            ("AI_SUGGESTION_TTL_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.suggestion_ttl, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_optional_value_is_an_error() {
        let result = OrchestratorConfig::from_lookup(lookup(&[
            (BASE_URL_ENV, "http://localhost:8000"),
            ("AI_INSIGHT_TTL_SECS", "soon"),
        ]));

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { name: "AI_INSIGHT_TTL_SECS", .. })
        ));
    }

    #[test]
    fn test_insight_path_encodes_post_id() {
        let paths = EndpointPaths::default();
        assert_eq!(paths.insight_for("p-42"), "/ai/posts/p-42/insight");
        assert_eq!(paths.insight_for("a/b c"), "/ai/posts/a%2Fb%20c/insight");
    }
}
