use crate::model::{ParticipantId, SessionId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum UpliftError {
    /// The queue entry was matched by a concurrent caller. Re-queue transparently.
    #[error("queue entry was claimed by a concurrent match")]
    QueueRaceLost,

    /// The queue entry outlived its TTL and was evicted. The caller must enqueue again.
    #[error("queue entry expired")]
    StaleEntryExpired,

    #[error("participant {0} is unreachable")]
    PeerUnreachable(ParticipantId),

    #[error("negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("media access denied: {0}")]
    MediaAccessDenied(String),

    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("participant is not a member of session {0}")]
    NotInSession(SessionId),

    #[error("participants {0} and {1} were not matched")]
    NotMatched(ParticipantId, ParticipantId),

    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("operation '{action}' is not allowed in state {state}")]
    InvalidTransition { action: &'static str, state: String },

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("channel closed")]
    ChannelClosed,

    #[error("transport error: {0}")]
    Transport(String),

    /// Reported by the server in a `serverError` frame or an HTTP error body.
    #[error("{message}")]
    Remote { code: ErrorCode, message: String },
}

impl UpliftError {
    pub fn code(&self) -> ErrorCode {
        match self {
            UpliftError::QueueRaceLost => ErrorCode::QueueRaceLost,
            UpliftError::StaleEntryExpired => ErrorCode::StaleEntryExpired,
            UpliftError::PeerUnreachable(_) => ErrorCode::PeerUnreachable,
            UpliftError::NegotiationFailed(_) => ErrorCode::NegotiationFailed,
            UpliftError::MediaAccessDenied(_) => ErrorCode::MediaAccessDenied,
            UpliftError::UnknownSession(_) => ErrorCode::UnknownSession,
            UpliftError::NotInSession(_) => ErrorCode::NotInSession,
            UpliftError::NotMatched(..) => ErrorCode::NotMatched,
            UpliftError::InvalidFeedback(_) => ErrorCode::InvalidFeedback,
            UpliftError::InvalidMessage(_) => ErrorCode::InvalidMessage,
            UpliftError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            UpliftError::Timeout(_) => ErrorCode::Timeout,
            UpliftError::ChannelClosed | UpliftError::Transport(_) => ErrorCode::Internal,
            UpliftError::Remote { code, .. } => *code,
        }
    }

    /// Rebuilds a typed error from its wire form where the code carries no ids.
    pub fn from_wire(code: ErrorCode, message: String) -> Self {
        match code {
            ErrorCode::QueueRaceLost => UpliftError::QueueRaceLost,
            ErrorCode::StaleEntryExpired => UpliftError::StaleEntryExpired,
            ErrorCode::NegotiationFailed => UpliftError::NegotiationFailed(message),
            ErrorCode::MediaAccessDenied => UpliftError::MediaAccessDenied(message),
            ErrorCode::InvalidFeedback => UpliftError::InvalidFeedback(message),
            ErrorCode::InvalidMessage => UpliftError::InvalidMessage(message),
            code => UpliftError::Remote { code, message },
        }
    }
}

/// Wire form of an error, carried by `serverError` frames and HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorCode {
    QueueRaceLost,
    StaleEntryExpired,
    PeerUnreachable,
    NegotiationFailed,
    MediaAccessDenied,
    UnknownSession,
    NotInSession,
    NotMatched,
    InvalidFeedback,
    InvalidMessage,
    InvalidTransition,
    Timeout,
    Internal,
}

impl ErrorCode {
    /// Whether the initiating endpoint can reasonably try again.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorCode::QueueRaceLost
                | ErrorCode::StaleEntryExpired
                | ErrorCode::PeerUnreachable
                | ErrorCode::Timeout
                | ErrorCode::Internal
        )
    }
}
