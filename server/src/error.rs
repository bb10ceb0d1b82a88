//! Error types for the session engine and the network server.

use crate::registry::ConnectionId;
use crate::vocabulary::VocabularyError;
use std::io;
use thiserror::Error;

/// Why a session operation was refused.
///
/// Most variants are answered with an `ERROR` line to the player who caused
/// them and leave the session untouched; see [`SessionError::notifies_sender`]
/// and [`SessionError::is_fatal`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("it is not your turn")]
    NotYourTurn,
    #[error("letter '{0}' was already guessed")]
    RepeatedLetter(char),
    #[error("a guess must be a single letter")]
    InvalidLetter,
    #[error("no round in progress")]
    NoRoundInProgress,
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("already joined as {0}")]
    AlreadyJoined(String),
    #[error("need at least {required} players, have {present}")]
    InsufficientPlayers { required: usize, present: usize },
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("connection {0} lost")]
    ConnectionLost(ConnectionId),
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),
    #[error("server is shutting down")]
    ShuttingDown,
}

impl SessionError {
    /// The connection that caused this error should be closed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::ProtocolViolation(_)
                | SessionError::ConnectionLost(_)
                | SessionError::UnknownConnection(_)
                | SessionError::ShuttingDown
        )
    }

    /// The sender gets an `ERROR` line describing the rejection.
    pub fn notifies_sender(&self) -> bool {
        matches!(
            self,
            SessionError::NotYourTurn
                | SessionError::RepeatedLetter(_)
                | SessionError::InvalidLetter
                | SessionError::NoRoundInProgress
                | SessionError::EmptyUsername
                | SessionError::AlreadyJoined(_)
                | SessionError::ProtocolViolation(_)
        )
    }
}

/// Failures that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Vocabulary(#[from] VocabularyError),
}
