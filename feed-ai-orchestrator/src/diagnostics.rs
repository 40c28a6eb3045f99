//! Diagnostic channel for degraded AI calls.
//!
//! Failures that are swallowed for the caller (absent insight, empty
//! suggestions, synthetic chat replies) stay observable here. The host
//! application subscribes to a broadcast of events; a bounded log keeps the
//! most recent ones for inspection. Every event is also traced.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};

use crate::error::ErrorKind;
use crate::types::SuggestionSource;

/// Default number of events retained and buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Insight service could not be reached or returned an error status
    InsightUnavailable {
        user_id: String,
        post_id: String,
        error: String,
    },
    /// Insight service answered with something unusable
    InsightMalformed {
        user_id: String,
        post_id: String,
        error: String,
    },
    /// Insight service has nothing for this post
    InsightMissing { user_id: String, post_id: String },
    /// A suggestion source failed and degraded to an empty set
    SuggestionsFailed {
        source: SuggestionSource,
        user_id: Option<String>,
        kind: ErrorKind,
        error: String,
    },
    /// A suggestion lookup was not attempted
    SuggestionsSkipped {
        source: SuggestionSource,
        reason: String,
    },
    /// Chat backend failed; a fallback reply was shown
    ChatFailed {
        session_id: String,
        kind: ErrorKind,
        error: String,
    },
    /// A reply arrived after its session was reset or dismissed
    ChatReplyDiscarded { session_id: String },
    /// Language detection failed (also reported to the caller)
    LanguageDetectionFailed { kind: ErrorKind, error: String },
}

impl DiagnosticKind {
    fn trace(&self) {
        match self {
            Self::InsightUnavailable { user_id, post_id, error } => {
                warn!(%user_id, %post_id, %error, "Insight service unavailable")
            }
            Self::InsightMalformed { user_id, post_id, error } => {
                warn!(%user_id, %post_id, %error, "Insight response malformed")
            }
            Self::InsightMissing { user_id, post_id } => {
                debug!(%user_id, %post_id, "No insight for post")
            }
            Self::SuggestionsFailed { source, user_id, kind, error } => warn!(
                source = source.as_str(),
                user_id = user_id.as_deref().unwrap_or("-"),
                ?kind,
                %error,
                "Suggestions degraded to empty"
            ),
            Self::SuggestionsSkipped { source, reason } => {
                debug!(source = source.as_str(), %reason, "Suggestions skipped")
            }
            Self::ChatFailed { session_id, kind, error } => {
                warn!(%session_id, ?kind, %error, "Chat query failed")
            }
            Self::ChatReplyDiscarded { session_id } => {
                debug!(%session_id, "Discarded reply for closed session")
            }
            Self::LanguageDetectionFailed { kind, error } => {
                warn!(?kind, %error, "Language detection failed")
            }
        }
    }
}

/// One diagnostic event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEvent {
    /// Unique event ID
    pub event_id: String,
    /// When it happened
    pub occurred_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

impl DiagnosticEvent {
    pub fn new(kind: DiagnosticKind) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            kind,
        }
    }
}

/// Counts by event family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticStats {
    pub total: usize,
    pub insight_unavailable: usize,
    pub insight_malformed: usize,
    pub insight_missing: usize,
    pub suggestion_failures: usize,
    pub chat_failures: usize,
    pub discarded_replies: usize,
    pub detection_failures: usize,
}

/// Broadcast channel plus bounded recent-event log.
pub struct Diagnostics {
    sender: broadcast::Sender<DiagnosticEvent>,
    /// Newest first
    recent: RwLock<VecDeque<DiagnosticEvent>>,
    max_entries: usize,
}

impl Diagnostics {
    /// Create with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create retaining at most `capacity` events.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            recent: RwLock::new(VecDeque::with_capacity(capacity)),
            max_entries: capacity,
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.sender.subscribe()
    }

    /// Record and publish an event.
    pub async fn emit(&self, kind: DiagnosticKind) {
        kind.trace();
        let event = DiagnosticEvent::new(kind);

        {
            let mut recent = self.recent.write().await;
            recent.push_front(event.clone());
            while recent.len() > self.max_entries {
                recent.pop_back();
            }
        }

        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Get recent events, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<DiagnosticEvent> {
        let recent = self.recent.read().await;
        recent.iter().take(limit).cloned().collect()
    }

    pub async fn count(&self) -> usize {
        self.recent.read().await.len()
    }

    pub async fn clear(&self) {
        self.recent.write().await.clear();
    }

    /// Get statistics over the retained events.
    pub async fn stats(&self) -> DiagnosticStats {
        let recent = self.recent.read().await;
        let mut stats = DiagnosticStats {
            total: recent.len(),
            ..Default::default()
        };

        for event in recent.iter() {
            match event.kind {
                DiagnosticKind::InsightUnavailable { .. } => stats.insight_unavailable += 1,
                DiagnosticKind::InsightMalformed { .. } => stats.insight_malformed += 1,
                DiagnosticKind::InsightMissing { .. } => stats.insight_missing += 1,
                DiagnosticKind::SuggestionsFailed { .. } => stats.suggestion_failures += 1,
                DiagnosticKind::SuggestionsSkipped { .. } => {}
                DiagnosticKind::ChatFailed { .. } => stats.chat_failures += 1,
                DiagnosticKind::ChatReplyDiscarded { .. } => stats.discarded_replies += 1,
                DiagnosticKind::LanguageDetectionFailed { .. } => stats.detection_failures += 1,
            }
        }

        stats
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::new()
    }
}
