//! Error types shared across the session, replication and rules layers.

use std::path::PathBuf;

use thiserror::Error;

use crate::game_state::chess_types::Color;

/// Failures raised by the rules oracle and the position model beneath it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("no piece on square index {0}")]
    NoPieceOnSquare(u8),

    #[error("move {0:#06x} is not legal in the current position")]
    IllegalMove(u16),

    #[error("cannot unapply a move: the history is empty")]
    EmptyHistory,

    #[error("invalid FEN: {0}")]
    Fen(String),

    #[error("invalid square text: {0}")]
    SquareText(String),

    #[error("invalid PGN: {0}")]
    Pgn(String),
}

/// Failures of the turn/session state machine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no game is running")]
    NotStarted,

    #[error("a move is already pending or a computer move is settling")]
    NotIdle,

    #[error("there is no pending move")]
    NoPendingMove,

    #[error("the board ownership token could not be claimed")]
    OwnershipUnavailable,

    #[error("it is the computer's turn to move for {0:?}")]
    ComputerTurn(Color),

    #[error("the game is over")]
    GameOver,

    #[error(transparent)]
    Rules(#[from] RulesError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

/// Failures in the replication layer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("replicated payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("participant {participant} does not own object {object}")]
    NotOwner { participant: u64, object: u32 },

    #[error("transport disconnected")]
    Disconnected,
}

/// Failures of the computer-opponent layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("no legal moves are available")]
    NoLegalMoves,

    #[error("search worker disconnected")]
    WorkerDisconnected,

    #[error(transparent)]
    Rules(#[from] RulesError),
}

/// Errors that can occur when loading session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error reading {path}: {error}")]
    Io {
        path: PathBuf,
        error: std::io::Error,
    },

    #[error("invalid configuration value: {0}")]
    Invalid(String),
}
