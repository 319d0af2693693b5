//! Sync error taxonomy.
//!
//! Everything the backend surface can do wrong collapses into four
//! categories with fixed handling policies: transient errors resync,
//! rejections notify and resync, terminal errors tear the session
//! down, and protocol ambiguity degrades to best-effort derivation.

use thiserror::Error;

/// Non-fatal rejection of an action by the backend.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RejectReason {
    /// 409: another seat owns the turn.
    NotYourTurn,
    /// 400: the match exists but is no longer accepting actions.
    MatchNotActive,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NotYourTurn => write!(f, "not your turn"),
            RejectReason::MatchNotActive => write!(f, "match not active"),
        }
    }
}

/// Fatal, session-ending backend conditions.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TerminalReason {
    /// 404: the match id is unknown to the backend.
    MatchNotFound,
    /// The backend reports the match already finished.
    AlreadyFinished,
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::MatchNotFound => write!(f, "match not found"),
            TerminalReason::AlreadyFinished => write!(f, "match already finished"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Timeout / connection reset; retried by resyncing, never by
    /// assuming success.
    #[error("transient network error: {0}")]
    Transient(String),

    /// Backend refused the action; surfaced as a non-fatal notice and
    /// followed by a forced resync.
    #[error("action rejected: {0}")]
    Rejected(RejectReason),

    /// The session cannot continue.
    #[error("terminal match error: {0}")]
    Terminal(TerminalReason),

    /// Payload missing expected structure; callers degrade to
    /// fallback derivation rather than failing the session.
    #[error("protocol ambiguity: {0}")]
    Protocol(String),
}

impl SyncError {
    pub fn transient(detail: impl Into<String>) -> Self {
        Self::Transient(detail.into())
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::Protocol(detail.into())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncError::Terminal(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Transient(err.to_string())
    }
}
