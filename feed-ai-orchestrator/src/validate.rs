//! Per-endpoint response validation.
//!
//! Each validator turns a raw backend body into a typed value or rejects it.
//! Nothing partial gets past this module.

use serde::Deserialize;

use crate::transport::RawPayload;
use crate::types::{
    Insight, Language, NavigationHint, PersonSuggestion, Sentiment, StrategySuggestion,
    SuggestionSet,
};

/// Why a payload was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Body is not JSON or does not have the expected shape
    #[error("Malformed payload: {0}")]
    Malformed(String),

    /// A required field is absent or null
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A field is present but its value is out of contract
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

fn parse<T: serde::de::DeserializeOwned>(payload: &RawPayload) -> Result<T, ValidationError> {
    serde_json::from_slice(&payload.body).map_err(|e| ValidationError::Malformed(e.to_string()))
}

// ============================================================================
// Chat
// ============================================================================

/// Validated chat reply.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub answer: String,
    pub navigation_hint: Option<NavigationHint>,
    pub attached_data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatWire {
    answer: Option<String>,
    #[serde(default)]
    navigation_hint: Option<serde_json::Value>,
    #[serde(default)]
    attached_data: Option<Vec<serde_json::Map<String, serde_json::Value>>>,
}

/// Validate a chat query response: `{answer, navigationHint?, attachedData?}`.
pub fn chat_reply(payload: &RawPayload) -> Result<ChatReply, ValidationError> {
    let wire: ChatWire = parse(payload)?;

    let answer = wire.answer.ok_or(ValidationError::MissingField("answer"))?;

    let navigation_hint = match wire.navigation_hint {
        None | Some(serde_json::Value::Null) => None,
        Some(value) => Some(serde_json::from_value::<NavigationHint>(value).map_err(|e| {
            ValidationError::InvalidValue {
                field: "navigationHint",
                reason: e.to_string(),
            }
        })?),
    };

    Ok(ChatReply {
        answer,
        navigation_hint,
        attached_data: wire.attached_data,
    })
}

// ============================================================================
// Language detection
// ============================================================================

#[derive(Deserialize)]
struct LanguageWire {
    language: Option<String>,
}

/// Validate a language detection response: `{language: "EN" | "NON-EN"}`.
pub fn language(payload: &RawPayload) -> Result<Language, ValidationError> {
    let wire: LanguageWire = parse(payload)?;

    match wire.language.as_deref() {
        Some("EN") => Ok(Language::En),
        Some("NON-EN") => Ok(Language::NonEn),
        Some(other) => Err(ValidationError::InvalidValue {
            field: "language",
            reason: format!("unexpected label {other:?}"),
        }),
        None => Err(ValidationError::MissingField("language")),
    }
}

// ============================================================================
// Post insight
// ============================================================================

#[derive(Deserialize)]
struct InsightEnvelopeWire {
    #[serde(default)]
    insight: Option<InsightWire>,
}

#[derive(Deserialize)]
struct InsightWire {
    #[serde(default)]
    sentiment: Option<String>,
    #[serde(default)]
    summary: Option<String>,
}

/// Validate a post-insight response: `{insight: {sentiment, summary?}}`.
///
/// `Ok(None)` means the backend has no insight for the post (`insight`
/// absent or null). An insight without `sentiment` is rejected outright.
pub fn insight(payload: &RawPayload) -> Result<Option<Insight>, ValidationError> {
    let wire: InsightEnvelopeWire = parse(payload)?;

    let Some(insight) = wire.insight else {
        return Ok(None);
    };

    let label = insight
        .sentiment
        .ok_or(ValidationError::MissingField("insight.sentiment"))?;

    let sentiment = Sentiment::parse(&label).ok_or_else(|| ValidationError::InvalidValue {
        field: "insight.sentiment",
        reason: format!("unknown sentiment {label:?}"),
    })?;

    Ok(Some(Insight {
        sentiment,
        summary: insight.summary,
    }))
}

// ============================================================================
// Suggestions
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuggestionsWire {
    suggestions: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    total_results: Option<usize>,
}

fn suggestion_items<T>(
    wire: SuggestionsWire,
    field: &'static str,
) -> Result<(Vec<T>, Option<usize>), ValidationError>
where
    T: serde::de::DeserializeOwned,
{
    let raw = wire
        .suggestions
        .ok_or(ValidationError::MissingField("suggestions"))?;

    let items = raw
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            serde_json::from_value::<T>(value).map_err(|e| ValidationError::InvalidValue {
                field,
                reason: format!("item {index}: {e}"),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok((items, wire.total_results))
}

fn check_score(score: f64, field: &'static str) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(ValidationError::InvalidValue {
            field,
            reason: format!("{score} is outside [0, 1]"),
        })
    }
}

/// Validate a people-suggestions response: `{suggestions: [...], totalResults}`.
pub fn people(payload: &RawPayload) -> Result<SuggestionSet<PersonSuggestion>, ValidationError> {
    let wire: SuggestionsWire = parse(payload)?;
    let (items, total) = suggestion_items::<PersonSuggestion>(wire, "suggestions")?;

    for person in &items {
        check_score(person.match_score, "matchScore")?;
    }

    Ok(SuggestionSet::new(items, total))
}

/// Validate a strategy-suggestions response: `{suggestions: [...]}`.
pub fn strategies(
    payload: &RawPayload,
) -> Result<SuggestionSet<StrategySuggestion>, ValidationError> {
    let wire: SuggestionsWire = parse(payload)?;
    let (items, total) = suggestion_items::<StrategySuggestion>(wire, "suggestions")?;

    for strategy in &items {
        if let Some(score) = strategy.match_score {
            check_score(score, "matchScore")?;
        }
    }

    Ok(SuggestionSet::new(items, total))
}
