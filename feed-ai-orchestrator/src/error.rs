//! Error classification shared by the lookups and the facade.

use serde::{Deserialize, Serialize};

use crate::transport::TransportError;
use crate::validate::ValidationError;

/// Failure of one backend fetch: the call failed, or its answer was rejected.
///
/// Fallback policies treat both the same; only diagnostics tell them apart.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(TransportError::Unreachable(_)) => ErrorKind::Unreachable,
            Self::Transport(TransportError::HttpStatus { .. }) => ErrorKind::HttpStatus,
            Self::Validation(_) => ErrorKind::Validation,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Error taxonomy exposed to UI callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network failure or timeout
    Unreachable,
    /// Backend-reported failure
    HttpStatus,
    /// Malformed payload
    Validation,
    /// Session invariant violated (e.g. double submit)
    InvalidState,
    /// Session torn down before its reply arrived
    SessionClosed,
}
