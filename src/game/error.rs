//! Domain Errors
//!
//! User-facing rejections for room and lobby operations. None of these are
//! fatal to a connection - a rejected action leaves state unchanged and the
//! `Display` text is sent back to the caller as an `error` event.

use thiserror::Error;

/// Reasons a room or lobby operation can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GameError {
    /// No room exists under the requested code.
    #[error("Room not found")]
    RoomNotFound,

    /// The room already holds two other duelists.
    #[error("Room is full")]
    RoomFull,

    /// The operation is reserved for the room host.
    #[error("Only the host can do that")]
    NotHost,

    /// The operation is not legal in the room's current phase.
    #[error("Not allowed in the current phase")]
    InvalidPhase,

    /// The match cannot start until the non-host duelist is ready.
    #[error("Waiting for the opponent to be ready")]
    OpponentNotReady,
}
