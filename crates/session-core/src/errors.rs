//! Session error types.
//!
//! No failure here terminates the process; every error is scoped to
//! one link or one message. Internal details are logged; the status
//! surface shown to the user comes from `status_message`.

use mesh_protocol::ProtocolError;
use thiserror::Error;

/// Session core error type.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Send attempted on a channel that is not open. The message is
    /// dropped and logged, never queued or retried.
    #[error("Channel not open")]
    ChannelNotOpen,

    /// Malformed or role-inappropriate message. Ignored and logged,
    /// never fatal.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Answer received for an unknown or abandoned invite.
    #[error("Stale invite: {0}")]
    StaleInvite(String),

    /// Offer or candidate generation failed; the join or invite
    /// attempt is aborted and its resources released. Retry permitted.
    #[error("Setup failure: {0}")]
    SetupFailure(String),

    /// Candidate gathering did not finish within the configured bound.
    #[error("Candidate gathering timed out")]
    CandidateTimeout,

    /// Operation requires host authority.
    #[error("Not the host")]
    NotHost,

    /// Host-side request validation rejected the request.
    #[error("Request denied: {0}")]
    RequestDenied(String),

    /// A directory key was already occupied.
    #[error("Directory conflict: {0}")]
    DirectoryConflict(String),

    /// No directory entry for the given key.
    #[error("Unknown peer: {0}")]
    UnknownPeer(String),

    /// The session is at its configured peer capacity.
    #[error("Session at capacity")]
    CapacityExceeded,

    /// Wire data problem.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Internal error (actor channel closed, etc).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// A short, user-facing status line for the `on_status` callback.
    #[must_use]
    pub fn status_message(&self) -> String {
        match self {
            SessionError::ChannelNotOpen => "Peer not reachable".to_string(),
            SessionError::StaleInvite(_) => "Invite expired".to_string(),
            SessionError::SetupFailure(_) | SessionError::CandidateTimeout => {
                "Connection setup failed, try again".to_string()
            }
            SessionError::NotHost => "Only the host can do that".to_string(),
            SessionError::RequestDenied(reason) => reason.clone(),
            SessionError::CapacityExceeded => "Session is full".to_string(),
            SessionError::Protocol(_) => "Received an invalid token".to_string(),
            SessionError::ProtocolViolation(_)
            | SessionError::DirectoryConflict(_)
            | SessionError::UnknownPeer(_)
            | SessionError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
