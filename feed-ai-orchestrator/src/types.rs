//! Common types for the feed-ai-orchestrator crate.
//!
//! Field names serialize in camelCase to match the backend wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-issued natural-language request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// The question as typed by the user
    pub text: String,
    /// Requesting user, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

impl Query {
    /// Create an anonymous query.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            user_id: None,
        }
    }

    /// Attach the requesting user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// Identifies one chat session on one AI surface.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an externally chosen identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// Structured link the UI can follow from an assistant answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationHint {
    /// Target route inside the app
    #[serde(alias = "route")]
    pub path: String,
    /// Optional link label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Route parameters
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

/// One message in a chat transcript.
///
/// Never mutated after it is appended; corrections are new turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    /// Unique turn identifier
    pub id: String,
    /// Author of the turn
    pub role: TurnRole,
    /// Message text
    pub text: String,
    /// Link suggested by the assistant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigation_hint: Option<NavigationHint>,
    /// Structured records attached to the answer (tables, lists)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attached_data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    /// When the turn was appended
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Create a user turn.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(TurnRole::User, text.into())
    }

    /// Create a plain assistant turn.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, text.into())
    }

    fn new(role: TurnRole, text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            text,
            navigation_hint: None,
            attached_data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_navigation_hint(mut self, hint: Option<NavigationHint>) -> Self {
        self.navigation_hint = hint;
        self
    }

    pub fn with_attached_data(
        mut self,
        data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
    ) -> Self {
        self.attached_data = data;
        self
    }
}

/// Uniquely identifies a post-insight lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequestKey {
    pub user_id: String,
    pub post_id: String,
}

impl InsightRequestKey {
    pub fn new(user_id: impl Into<String>, post_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            post_id: post_id.into(),
        }
    }
}

impl fmt::Display for InsightRequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.post_id)
    }
}

/// Overall sentiment of a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl Sentiment {
    /// Parse the backend's label, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// AI-derived sentiment annotation attached to a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub sentiment: Sentiment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// Result of language detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "NON-EN")]
    NonEn,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "EN",
            Self::NonEn => "NON-EN",
        }
    }
}

/// Which suggestion backend to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    People,
    Strategies,
}

impl SuggestionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::People => "people",
            Self::Strategies => "strategies",
        }
    }
}

impl std::str::FromStr for SuggestionSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "people" => Ok(Self::People),
            "strategies" => Ok(Self::Strategies),
            other => Err(format!("unknown suggestion source: {other}")),
        }
    }
}

/// An ordered, ranked list as returned by a suggestion backend.
///
/// `total_results` is never smaller than `items.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSet<T> {
    pub items: Vec<T>,
    pub total_results: usize,
}

impl<T> SuggestionSet<T> {
    /// Build a set, raising `total_results` to the item count if needed.
    pub fn new(items: Vec<T>, total_results: Option<usize>) -> Self {
        let total_results = total_results.unwrap_or(0).max(items.len());
        Self {
            items,
            total_results,
        }
    }

    /// The "nothing to suggest" set.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_results: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T> Default for SuggestionSet<T> {
    fn default() -> Self {
        Self::empty()
    }
}

/// A person suggested to follow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonSuggestion {
    #[serde(alias = "id")]
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Relevance in `[0, 1]`
    pub match_score: f64,
    /// Why this person was suggested
    pub match_reason: String,
    /// Backend fields not modelled here
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A trading strategy suggested to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySuggestion {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    /// Backend fields not modelled here (returns, risk, author, ...)
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Suggestions from either source behind one type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum Suggestions {
    People(SuggestionSet<PersonSuggestion>),
    Strategies(SuggestionSet<StrategySuggestion>),
}

impl Suggestions {
    /// Empty set for the given source.
    pub fn empty(source: SuggestionSource) -> Self {
        match source {
            SuggestionSource::People => Self::People(SuggestionSet::empty()),
            SuggestionSource::Strategies => Self::Strategies(SuggestionSet::empty()),
        }
    }

    pub fn source(&self) -> SuggestionSource {
        match self {
            Self::People(_) => SuggestionSource::People,
            Self::Strategies(_) => SuggestionSource::Strategies,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::People(set) => set.items.len(),
            Self::Strategies(set) => set.items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_results(&self) -> usize {
        match self {
            Self::People(set) => set.total_results,
            Self::Strategies(set) => set.total_results,
        }
    }
}
