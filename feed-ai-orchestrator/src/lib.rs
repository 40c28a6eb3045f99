//! Feed AI Orchestrator - AI interaction orchestration for the trading feed
//!
//! Mediates between UI surfaces and the independent, unreliable AI endpoints
//! (chat, language detection, post insight, people and strategy suggestions):
//! - Ordered chat transcripts across asynchronous round-trips
//! - One network call per logical resource, however many callers ask
//! - Per-endpoint degradation so one failing subsystem stays contained
//! - One result envelope for every caller
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             AiOrchestrator              │
//! │   (routing + {ok, value | kind, msg})   │
//! └───┬──────────┬───────────┬──────────┬───┘
//!     ▼          ▼           ▼          ▼
//! ┌────────┐ ┌──────────┐ ┌────────┐ ┌────────┐
//! │  Chat  │ │Suggestion│ │Insight │ │Language│
//! │Sessions│ │Aggregator│ │Lookup  │ │Detector│
//! └───┬────┘ └────┬─────┘ └───┬────┘ └───┬────┘
//!     │           └─────┬─────┘          │
//!     │          ┌──────▼──────┐         │
//!     │          │DedupRegistry│         │
//!     │          └──────┬──────┘         │
//!     ▼                 ▼                ▼
//! ┌─────────────────────────────────────────┐
//! │     Transport (HTTP / mock) + validate  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Failures that are swallowed for the caller are published on the
//! [`diagnostics`] channel.

pub mod chat;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod insight;
pub mod language;
pub mod registry;
pub mod service;
pub mod stream;
pub mod suggestions;
pub mod transport;
pub mod types;
pub mod validate;

// Re-export main types for convenience
pub use chat::{ChatError, ChatSessionManager, SessionState, FALLBACK_REPLY};
pub use config::{ConfigError, EndpointPaths, OrchestratorConfig};
pub use diagnostics::{DiagnosticEvent, DiagnosticKind, Diagnostics};
pub use error::{ErrorKind, FetchError};
pub use registry::{spawn_purge_task, DedupRegistry, RegistryStats};
pub use service::{AiOrchestrator, Envelope, EnvelopeError, ServiceError};
pub use stream::TranscriptStream;
pub use transport::{HttpTransport, MockTransport, Transport, TransportError};
pub use types::*;
pub use validate::ValidationError;
