//! Chat session management.
//!
//! Each session is a small state machine:
//!
//! ```text
//!            submit(query)                 reply / fallback appended
//!   Idle ──────────────────▶ AwaitingResponse ──────────────────────▶ Idle
//!     ▲  user turn appended          │
//!     │                              │ submit(query) → InvalidState
//!     └──────────────────────────────┘ (transcript untouched)
//! ```
//!
//! The user turn is appended as soon as the query is accepted. The backend
//! round-trip runs on its own task, so a caller that stops waiting cannot
//! leave the session stuck in `AwaitingResponse`. Backend and validation
//! failures become a fallback assistant turn; the raw error only goes to the
//! diagnostic channel.
//!
//! `reset` and `dismiss` close the current session object. A reply that
//! arrives for a closed session is discarded instead of being appended.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::diagnostics::{DiagnosticKind, Diagnostics};
use crate::error::{ErrorKind, FetchError};
use crate::stream::TranscriptStream;
use crate::transport::{Transport, TransportRequest};
use crate::types::{ChatTurn, Query, SessionId};
use crate::validate;

/// Assistant text shown when the chat backend fails.
pub const FALLBACK_REPLY: &str = "Sorry, I couldn't get an answer right now. Please try again.";

/// Live turns buffered per transcript reader.
const TRANSCRIPT_BUFFER: usize = 64;

/// Where a session is in its query cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingResponse,
}

/// Contract violations surfaced to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    /// A query was submitted while another is awaiting its response
    #[error("Session {session_id} already has a query awaiting a response")]
    InvalidState { session_id: SessionId },

    /// The session was reset or dismissed before its reply arrived
    #[error("Session {session_id} was closed before its reply arrived")]
    SessionClosed { session_id: SessionId },
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::SessionClosed { .. } => ErrorKind::SessionClosed,
        }
    }
}

struct SessionInner {
    transcript: Vec<ChatTurn>,
    pending: Option<Query>,
    /// `None` once the session is closed
    turns: Option<broadcast::Sender<ChatTurn>>,
}

impl SessionInner {
    fn append(&mut self, turn: ChatTurn) {
        self.transcript.push(turn.clone());
        if let Some(turns) = &self.turns {
            // No readers is fine
            let _ = turns.send(turn);
        }
    }
}

/// One conversation: an ordered transcript and at most one pending query.
pub struct ChatSession {
    id: SessionId,
    /// Distinguishes this session from any later one under the same id
    identity: Uuid,
    inner: RwLock<SessionInner>,
}

impl ChatSession {
    fn new(id: SessionId) -> Self {
        let (turns, _) = broadcast::channel(TRANSCRIPT_BUFFER);
        Self {
            id,
            identity: Uuid::new_v4(),
            inner: RwLock::new(SessionInner {
                transcript: Vec::new(),
                pending: None,
                turns: Some(turns),
            }),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn identity(&self) -> Uuid {
        self.identity
    }

    pub async fn state(&self) -> SessionState {
        if self.inner.read().await.pending.is_some() {
            SessionState::AwaitingResponse
        } else {
            SessionState::Idle
        }
    }

    /// The query awaiting a response, if any.
    pub async fn pending(&self) -> Option<Query> {
        self.inner.read().await.pending.clone()
    }

    /// Snapshot of the transcript, oldest turn first.
    pub async fn transcript(&self) -> Vec<ChatTurn> {
        self.inner.read().await.transcript.clone()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.read().await.turns.is_none()
    }

    /// Stream every turn so far, then each new one until the session closes.
    pub async fn stream(&self) -> TranscriptStream {
        let inner = self.inner.read().await;
        let receiver = match &inner.turns {
            Some(turns) => turns.subscribe(),
            None => broadcast::channel(1).1,
        };
        TranscriptStream::new(self.id.clone(), inner.transcript.clone(), receiver)
    }

    /// Accept a query: enforce the single-pending gate and append the user turn.
    async fn begin(&self, query: &Query) -> Result<ChatTurn, ChatError> {
        let mut inner = self.inner.write().await;

        if inner.turns.is_none() {
            return Err(ChatError::SessionClosed {
                session_id: self.id.clone(),
            });
        }
        if inner.pending.is_some() {
            return Err(ChatError::InvalidState {
                session_id: self.id.clone(),
            });
        }

        let turn = ChatTurn::user(query.text.clone());
        inner.append(turn.clone());
        inner.pending = Some(query.clone());
        Ok(turn)
    }

    /// Append the assistant turn and return to idle, unless closed meanwhile.
    async fn complete(&self, turn: ChatTurn) -> Result<ChatTurn, ChatError> {
        let mut inner = self.inner.write().await;

        if inner.turns.is_none() {
            return Err(ChatError::SessionClosed {
                session_id: self.id.clone(),
            });
        }

        inner.append(turn.clone());
        inner.pending = None;
        Ok(turn)
    }

    /// Close the session. Open transcript streams end; late replies are dropped.
    async fn close(&self) {
        let mut inner = self.inner.write().await;
        inner.turns = None;
        inner.pending = None;
    }
}

/// Owns every chat session, keyed by surface.
pub struct ChatSessionManager {
    transport: Arc<dyn Transport>,
    path: String,
    timeout: Duration,
    sessions: DashMap<SessionId, Arc<ChatSession>>,
    diagnostics: Arc<Diagnostics>,
}

impl ChatSessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        config: &OrchestratorConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> Self {
        Self {
            transport,
            path: config.endpoints.chat.clone(),
            timeout: config.chat_timeout,
            sessions: DashMap::new(),
            diagnostics,
        }
    }

    /// Submit a query and wait for the assistant's turn.
    ///
    /// Backend failures still yield a turn (the fallback reply). Errors are
    /// reserved for `InvalidState` and for replies whose session was closed.
    pub async fn submit(&self, session_id: &SessionId, query: Query) -> Result<ChatTurn, ChatError> {
        let session = self.session_or_create(session_id);
        session.begin(&query).await?;

        debug!(%session_id, identity = %session.identity(), "Query submitted");

        let mut body = serde_json::json!({ "query": query.text });
        if let Some(user_id) = &query.user_id {
            body["userId"] = serde_json::json!(user_id);
        }
        let request = TransportRequest::post(self.path.clone(), body, self.timeout);

        let task = tokio::spawn(round_trip(
            Arc::clone(&self.transport),
            request,
            Arc::clone(&session),
            Arc::clone(&self.diagnostics),
        ));

        match task.await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(%session_id, %error, "Chat round-trip task failed");
                session.complete(ChatTurn::assistant(FALLBACK_REPLY)).await
            }
        }
    }

    /// Get the live session for a surface.
    pub fn session(&self, session_id: &SessionId) -> Option<Arc<ChatSession>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    /// Transcript of a session; empty if it does not exist.
    pub async fn transcript(&self, session_id: &SessionId) -> Vec<ChatTurn> {
        match self.session(session_id) {
            Some(session) => session.transcript().await,
            None => Vec::new(),
        }
    }

    pub async fn state(&self, session_id: &SessionId) -> SessionState {
        match self.session(session_id) {
            Some(session) => session.state().await,
            None => SessionState::Idle,
        }
    }

    /// Open a transcript stream, creating the session on first use.
    pub async fn stream(&self, session_id: &SessionId) -> TranscriptStream {
        self.session_or_create(session_id).stream().await
    }

    /// Replace a session with a fresh, empty one.
    pub async fn reset(&self, session_id: &SessionId) -> Arc<ChatSession> {
        let fresh = Arc::new(ChatSession::new(session_id.clone()));
        let previous = self.sessions.insert(session_id.clone(), Arc::clone(&fresh));

        if let Some(previous) = previous {
            previous.close().await;
        }

        info!(%session_id, identity = %fresh.identity(), "Chat session reset");
        fresh
    }

    /// Tear a session down. Returns false if there was none.
    pub async fn dismiss(&self, session_id: &SessionId) -> bool {
        match self.sessions.remove(session_id) {
            Some((_, session)) => {
                session.close().await;
                info!(%session_id, "Chat session dismissed");
                true
            }
            None => false,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn session_or_create(&self, session_id: &SessionId) -> Arc<ChatSession> {
        let session = self.sessions.entry(session_id.clone()).or_insert_with(|| {
            debug!(%session_id, "Chat session created");
            Arc::new(ChatSession::new(session_id.clone()))
        });
        Arc::clone(session.value())
    }
}

async fn round_trip(
    transport: Arc<dyn Transport>,
    request: TransportRequest,
    session: Arc<ChatSession>,
    diagnostics: Arc<Diagnostics>,
) -> Result<ChatTurn, ChatError> {
    let outcome = match transport.execute(request).await {
        Ok(payload) => validate::chat_reply(&payload).map_err(FetchError::from),
        Err(error) => Err(FetchError::from(error)),
    };

    let turn = match outcome {
        Ok(reply) => ChatTurn::assistant(reply.answer)
            .with_navigation_hint(reply.navigation_hint)
            .with_attached_data(reply.attached_data),
        Err(error) => {
            diagnostics
                .emit(DiagnosticKind::ChatFailed {
                    session_id: session.id().to_string(),
                    kind: error.kind(),
                    error: error.to_string(),
                })
                .await;
            ChatTurn::assistant(FALLBACK_REPLY)
        }
    };

    let completed = session.complete(turn).await;
    if completed.is_err() {
        diagnostics
            .emit(DiagnosticKind::ChatReplyDiscarded {
                session_id: session.id().to_string(),
            })
            .await;
    }
    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::{MockResponse, MockTransport};
    use crate::types::TurnRole;
    use futures::StreamExt;
    use serde_json::json;

    const PATH: &str = "/ai/query";

    fn manager(transport: Arc<MockTransport>) -> (Arc<ChatSessionManager>, Arc<Diagnostics>) {
        let config = OrchestratorConfig::new("http://ai.test")
            .unwrap()
            .with_chat_timeout(Duration::from_secs(2));
        let diagnostics = Arc::new(Diagnostics::new());
        let manager = ChatSessionManager::new(transport, &config, Arc::clone(&diagnostics));
        (Arc::new(manager), diagnostics)
    }

    fn answering(answer: &str) -> Arc<MockTransport> {
        Arc::new(MockTransport::new().with_response(PATH, MockResponse::Json(json!({ "answer": answer }))))
    }

    #[tokio::test]
    async fn test_submit_appends_user_and_assistant_turns() {
        let transport = Arc::new(MockTransport::new().with_response(
            PATH,
            MockResponse::Json(json!({
                "answer": "Here are today's top movers",
                "navigationHint": { "path": "/markets/movers" },
                "attachedData": [{ "symbol": "NVDA", "change": 4.2 }]
            })),
        ));
        let (manager, _) = manager(Arc::clone(&transport));
        let session = SessionId::new("s1");

        let turn = manager
            .submit(&session, Query::new("Top movers?").with_user("u1"))
            .await
            .unwrap();

        assert_eq!(turn.role, TurnRole::Assistant);
        assert_eq!(turn.navigation_hint.unwrap().path, "/markets/movers");
        assert_eq!(turn.attached_data.unwrap().len(), 1);

        let transcript = manager.transcript(&session).await;
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].text, "Top movers?");
        assert_eq!(manager.state(&session).await, SessionState::Idle);

        let body = transport.requests()[0].body.clone().unwrap();
        assert_eq!(body, json!({ "query": "Top movers?", "userId": "u1" }));
    }

    #[tokio::test]
    async fn test_backend_failure_yields_fallback_turn() {
        let transport = Arc::new(MockTransport::new().with_response(PATH, MockResponse::Status(500)));
        let (manager, diagnostics) = manager(transport);
        let session = SessionId::new("s1");

        let turn = manager.submit(&session, Query::new("Hi")).await.unwrap();

        assert_eq!(turn.text, FALLBACK_REPLY);
        assert_eq!(manager.state(&session).await, SessionState::Idle);

        let recent = diagnostics.recent(1).await;
        assert!(matches!(
            recent[0].kind,
            DiagnosticKind::ChatFailed { kind: ErrorKind::HttpStatus, .. }
        ));
    }

    #[tokio::test]
    async fn test_malformed_reply_yields_fallback_turn() {
        let transport = Arc::new(
            MockTransport::new().with_response(PATH, MockResponse::Json(json!({ "text": "no answer field" }))),
        );
        let (manager, diagnostics) = manager(transport);

        let turn = manager
            .submit(&SessionId::new("s1"), Query::new("Hi"))
            .await
            .unwrap();

        assert_eq!(turn.text, FALLBACK_REPLY);
        assert_eq!(diagnostics.stats().await.chat_failures, 1);
    }

    #[tokio::test]
    async fn test_second_submit_while_pending_is_invalid_state() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(PATH, MockResponse::Json(json!({ "answer": "ok" })))
                .with_delay(Duration::from_millis(100)),
        );
        let (manager, _) = manager(transport);
        let session = SessionId::new("s1");

        let first = {
            let manager = Arc::clone(&manager);
            let session = session.clone();
            tokio::spawn(async move { manager.submit(&session, Query::new("first")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(manager.state(&session).await, SessionState::AwaitingResponse);
        let before = manager.transcript(&session).await;

        let second = manager.submit(&session, Query::new("second")).await;

        assert!(matches!(second, Err(ChatError::InvalidState { .. })));
        assert_eq!(manager.transcript(&session).await, before);

        assert!(first.await.unwrap().is_ok());
        assert_eq!(manager.transcript(&session).await.len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_submissions_alternate() {
        let (manager, _) = manager(answering("noted"));
        let session = SessionId::new("s1");

        for i in 0..5 {
            manager
                .submit(&session, Query::new(format!("q{i}")))
                .await
                .unwrap();
        }

        let transcript = manager.transcript(&session).await;
        assert_eq!(transcript.len(), 10);
        for (index, turn) in transcript.iter().enumerate() {
            let expected = if index % 2 == 0 {
                TurnRole::User
            } else {
                TurnRole::Assistant
            };
            assert_eq!(turn.role, expected);
        }
        assert_eq!(transcript[4].text, "q2");
    }

    #[tokio::test]
    async fn test_reply_after_reset_is_discarded() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(PATH, MockResponse::Json(json!({ "answer": "late" })))
                .with_delay(Duration::from_millis(80)),
        );
        let (manager, diagnostics) = manager(transport);
        let session = SessionId::new("s1");

        let pending = {
            let manager = Arc::clone(&manager);
            let session = session.clone();
            tokio::spawn(async move { manager.submit(&session, Query::new("hello?")).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        let fresh = manager.reset(&session).await;

        let outcome = pending.await.unwrap();
        assert!(matches!(outcome, Err(ChatError::SessionClosed { .. })));

        assert!(manager.transcript(&session).await.is_empty());
        assert_eq!(fresh.state().await, SessionState::Idle);
        assert_eq!(diagnostics.stats().await.discarded_replies, 1);
    }

    #[tokio::test]
    async fn test_dismiss_removes_session() {
        let (manager, _) = manager(answering("hi"));
        let session = SessionId::new("s1");

        manager.submit(&session, Query::new("hello")).await.unwrap();
        assert_eq!(manager.session_count(), 1);

        assert!(manager.dismiss(&session).await);
        assert!(!manager.dismiss(&session).await);
        assert!(manager.transcript(&session).await.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_strand_session() {
        let transport = Arc::new(
            MockTransport::new()
                .with_response(PATH, MockResponse::Json(json!({ "answer": "done" })))
                .with_delay(Duration::from_millis(50)),
        );
        let (manager, _) = manager(transport);
        let session = SessionId::new("s1");

        let caller = {
            let manager = Arc::clone(&manager);
            let session = session.clone();
            tokio::spawn(async move { manager.submit(&session, Query::new("q")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        caller.abort();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(manager.state(&session).await, SessionState::Idle);
        assert_eq!(manager.transcript(&session).await.len(), 2);
    }

    #[tokio::test]
    async fn test_stream_replays_then_follows_until_dismissed() {
        let (manager, _) = manager(answering("pong"));
        let session = SessionId::new("s1");

        manager.submit(&session, Query::new("ping")).await.unwrap();
        let mut stream = manager.stream(&session).await;

        manager.submit(&session, Query::new("ping again")).await.unwrap();
        manager.dismiss(&session).await;

        let texts: Vec<String> = (&mut stream).map(|turn| turn.text).collect().await;
        assert_eq!(texts, vec!["ping", "pong", "ping again", "pong"]);
        assert!(stream.is_complete());
    }
}
