//! Presentation events emitted by the session.

use std::fmt;

use crate::game_state::chess_types::{Color, PieceRecord, Square};
use crate::oracle::rules_oracle::GameOutcome;
use crate::session::board_occupancy::PieceId;
use crate::session::options::GameMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    Checkmate,
    Stalemate,
    Repetition,
    FiftyMoveRule,
    InsufficientMaterial,
    Timeout,
}

impl LossReason {
    pub fn from_outcome(outcome: GameOutcome) -> Option<Self> {
        match outcome {
            GameOutcome::Playing => None,
            GameOutcome::WhiteIsMated | GameOutcome::BlackIsMated => Some(LossReason::Checkmate),
            GameOutcome::Stalemate => Some(LossReason::Stalemate),
            GameOutcome::Repetition => Some(LossReason::Repetition),
            GameOutcome::FiftyMoveRule => Some(LossReason::FiftyMoveRule),
            GameOutcome::InsufficientMaterial => Some(LossReason::InsufficientMaterial),
        }
    }
}

impl fmt::Display for LossReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LossReason::Checkmate => "Checkmate",
            LossReason::Stalemate => "Stalemate",
            LossReason::Repetition => "Repetition",
            LossReason::FiftyMoveRule => "FiftyMoveRule",
            LossReason::InsufficientMaterial => "InsufficientMaterial",
            LossReason::Timeout => "Timeout",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PieceAdded {
        id: PieceId,
        square: Square,
        piece: PieceRecord,
        spawned: bool,
    },
    PieceMoved {
        id: PieceId,
        from: Square,
        to: Square,
        piece: PieceRecord,
    },
    /// `to` is the graveyard sentinel of the piece's color.
    PieceRemoved {
        id: PieceId,
        square: Square,
        to: Square,
        piece: PieceRecord,
    },
    /// A promoted piece taken back into the hidden reserve by an undo.
    PieceHidden {
        id: PieceId,
        square: Square,
        piece: PieceRecord,
    },
    UndoAvailable(Option<Color>),
    PlayerLost {
        color: Color,
        reason: LossReason,
    },
    TurnChanged(Option<Color>),
    GameModeChanged(GameMode),
}
