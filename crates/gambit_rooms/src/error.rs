//! Error taxonomy for room operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::identity::RoomId;
use crate::stake::TokenAmount;

/// Broad class of a rejected request, reported to clients as the `type`
/// field of an `error` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before touching room state.
    ValidationError,
    /// Room or session absent.
    NotFoundError,
    /// The room exists but the request is inconsistent with its state.
    StateConflictError,
    /// The wallet is not a participant allowed to perform the action.
    AuthorizationError,
    /// Balance check, signature verification or chain call failed.
    ExternalServiceError,
    /// Too many actions from one connection in the current window.
    RateLimitError,
    /// An invariant was violated while handling the event.
    InternalError,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "validation_error",
            Self::NotFoundError => "not_found_error",
            Self::StateConflictError => "state_conflict_error",
            Self::AuthorizationError => "authorization_error",
            Self::ExternalServiceError => "external_service_error",
            Self::RateLimitError => "rate_limit_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invariant violations inside the clock.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("clock has no active color")]
    NoActiveColor,
    #[error("clock is paused")]
    Paused,
}

/// Everything a room or the registry can refuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid game configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid move notation: {0}")]
    InvalidMoveNotation(String),

    #[error("room {0} not found")]
    RoomNotFound(RoomId),

    #[error("room {0} already exists")]
    RoomExists(RoomId),

    #[error("room is full")]
    RoomFull,

    #[error("you are already in this game")]
    AlreadyInRoom,

    #[error("game is already finished")]
    GameFinished,

    #[error("game has not started yet")]
    GameNotStarted,

    #[error("game has already started")]
    GameAlreadyStarted,

    #[error("not your turn")]
    NotYourTurn,

    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("no active draw offer")]
    NoActiveOffer,

    #[error("a draw offer is already pending")]
    DrawAlreadyOffered,

    #[error("stakes are locked")]
    StakesLocked,

    #[error("stake amount changed while the request was pending")]
    StakeChanged,

    #[error("no stake is configured for this room")]
    NoStakeConfigured,

    #[error("bet for {0} already placed")]
    BetAlreadyPlaced(crate::color::Color),

    #[error("spectator limit reached")]
    SpectatorLimit,

    #[error("wallet is not a player in this game")]
    NotAPlayer,

    #[error("this connection does not hold the seat, reconnect to the game first")]
    StaleConnection,

    #[error("wallet is not seated as {0}")]
    WrongSeat(crate::color::Color),

    #[error("insufficient funds: {required} required, {available} available")]
    InsufficientFunds {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("clock invariant violated: {0}")]
    Clock(#[from] ClockError),
}

impl RoomError {
    /// Maps the error to its class in the error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) | Self::InvalidConfig(_) | Self::InvalidMoveNotation(_) => {
                ErrorKind::ValidationError
            }
            Self::RoomNotFound(_) => ErrorKind::NotFoundError,
            Self::NotAPlayer | Self::StaleConnection | Self::WrongSeat(_) => {
                ErrorKind::AuthorizationError
            }
            Self::Clock(_) => ErrorKind::InternalError,
            Self::RoomExists(_)
            | Self::RoomFull
            | Self::AlreadyInRoom
            | Self::GameFinished
            | Self::GameNotStarted
            | Self::GameAlreadyStarted
            | Self::NotYourTurn
            | Self::IllegalMove(_)
            | Self::NoActiveOffer
            | Self::DrawAlreadyOffered
            | Self::StakesLocked
            | Self::StakeChanged
            | Self::NoStakeConfigured
            | Self::BetAlreadyPlaced(_)
            | Self::SpectatorLimit
            | Self::InsufficientFunds { .. } => ErrorKind::StateConflictError,
        }
    }
}
