//! The rules-engine boundary consumed by the session.
//!
//! The session never inspects bitboards; it proposes `(from, to)` pairs, asks
//! for legal moves, applies or unapplies them and reads back the piece-change
//! trail to keep its own occupancy in step.

use std::fmt;

use crate::errors::RulesError;
use crate::game_state::chess_rules::{FIFTY_MOVE_RULE_HALFMOVES, REPETITION_LIMIT};
use crate::game_state::chess_types::{Color, PieceKind, PieceRecord, SquareIndex};
use crate::game_state::game_state::GameState;
use crate::move_generation::legal_move_apply::{make_move, unmake_move};
use crate::move_generation::legal_move_checks::is_king_in_check;
use crate::move_generation::legal_move_generator::generate_legal_moves;
use crate::moves::move_descriptions::Move;

pub use crate::move_generation::legal_move_apply::PieceChange;

/// How the game stands for the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameOutcome {
    Playing,
    WhiteIsMated,
    BlackIsMated,
    Stalemate,
    Repetition,
    FiftyMoveRule,
    InsufficientMaterial,
}

impl GameOutcome {
    #[inline]
    pub const fn is_over(self) -> bool {
        !matches!(self, GameOutcome::Playing)
    }
}

impl fmt::Display for GameOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GameOutcome::Playing => "Playing",
            GameOutcome::WhiteIsMated => "Checkmate",
            GameOutcome::BlackIsMated => "Checkmate",
            GameOutcome::Stalemate => "Stalemate",
            GameOutcome::Repetition => "Repetition",
            GameOutcome::FiftyMoveRule => "FiftyMoveRule",
            GameOutcome::InsufficientMaterial => "InsufficientMaterial",
        };
        f.write_str(text)
    }
}

pub trait RulesOracle: Send {
    fn load_start_position(&mut self);

    fn legal_moves(&self) -> Result<Vec<Move>, RulesError>;

    /// Apply a move that came from `legal_moves`.
    fn apply_move(&mut self, mv: Move) -> Result<Vec<PieceChange>, RulesError>;

    /// Revert `mv`, which must be the most recently applied move.
    fn unapply_move(&mut self, mv: Move) -> Result<Vec<PieceChange>, RulesError>;

    fn in_check(&self) -> bool;

    fn position_hash(&self) -> u64;

    fn side_to_move(&self) -> Color;

    fn halfmove_clock(&self) -> u16;

    fn repetition_count(&self) -> usize;

    /// Piece counts over both colors, indexed by `PieceKind::index`.
    fn material(&self) -> [u32; 6];

    fn piece_at(&self, square: SquareIndex) -> Option<PieceRecord>;

    fn fen(&self) -> String;

    /// Independent copy for speculative search.
    fn shadow_copy(&self) -> Box<dyn RulesOracle>;

    /// First legal move from `from` to `to`, or `Move::INVALID`.
    fn find_legal_move(&self, from: SquareIndex, to: SquareIndex) -> Result<Move, RulesError> {
        Ok(self
            .legal_moves()?
            .into_iter()
            .find(|mv| mv.from() == from && mv.to() == to)
            .unwrap_or(Move::INVALID))
    }

    /// Legal move matching a replicated wire value: exact match first, then
    /// the first legal move with the same squares.
    fn match_wire_move(&self, wire: Move) -> Result<Move, RulesError> {
        let legal = self.legal_moves()?;
        if legal.contains(&wire) {
            return Ok(wire);
        }
        Ok(legal
            .into_iter()
            .find(|mv| mv.same_squares(wire))
            .unwrap_or(Move::INVALID))
    }

    /// Classify the position for the side to move.
    fn outcome(&self) -> Result<GameOutcome, RulesError> {
        if self.legal_moves()?.is_empty() {
            if self.in_check() {
                return Ok(match self.side_to_move() {
                    Color::White => GameOutcome::WhiteIsMated,
                    Color::Black => GameOutcome::BlackIsMated,
                });
            }
            return Ok(GameOutcome::Stalemate);
        }

        if self.halfmove_clock() >= FIFTY_MOVE_RULE_HALFMOVES {
            return Ok(GameOutcome::FiftyMoveRule);
        }

        if self.repetition_count() >= REPETITION_LIMIT {
            return Ok(GameOutcome::Repetition);
        }

        let counts = self.material();
        let heavy = counts[PieceKind::Pawn.index()]
            + counts[PieceKind::Rook.index()]
            + counts[PieceKind::Queen.index()];
        if heavy == 0
            && (counts[PieceKind::Knight.index()] == 1 || counts[PieceKind::Bishop.index()] == 1)
        {
            return Ok(GameOutcome::InsufficientMaterial);
        }

        Ok(GameOutcome::Playing)
    }
}

/// Reference oracle backed by the bitboard `GameState`.
#[derive(Debug, Clone)]
pub struct StandardRules {
    state: GameState,
}

impl StandardRules {
    pub fn new() -> Self {
        Self {
            state: GameState::new_game(),
        }
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        Ok(Self {
            state: GameState::from_fen(fen)?,
        })
    }

    pub fn game_state(&self) -> &GameState {
        &self.state
    }
}

impl Default for StandardRules {
    fn default() -> Self {
        Self::new()
    }
}

impl RulesOracle for StandardRules {
    fn load_start_position(&mut self) {
        self.state = GameState::new_game();
    }

    fn legal_moves(&self) -> Result<Vec<Move>, RulesError> {
        generate_legal_moves(&self.state)
    }

    fn apply_move(&mut self, mv: Move) -> Result<Vec<PieceChange>, RulesError> {
        make_move(&mut self.state, mv)
    }

    fn unapply_move(&mut self, mv: Move) -> Result<Vec<PieceChange>, RulesError> {
        match self.state.undo_stack.last() {
            Some(undo) if undo.mv == mv => unmake_move(&mut self.state),
            Some(_) => Err(RulesError::IllegalMove(mv.wire())),
            None => Err(RulesError::EmptyHistory),
        }
    }

    fn in_check(&self) -> bool {
        is_king_in_check(&self.state, self.state.side_to_move)
    }

    fn position_hash(&self) -> u64 {
        self.state.zobrist_key
    }

    fn side_to_move(&self) -> Color {
        self.state.side_to_move
    }

    fn halfmove_clock(&self) -> u16 {
        self.state.halfmove_clock
    }

    fn repetition_count(&self) -> usize {
        self.state.repetition_count()
    }

    fn material(&self) -> [u32; 6] {
        self.state.piece_counts()
    }

    fn piece_at(&self, square: SquareIndex) -> Option<PieceRecord> {
        self.state.piece_at(square)
    }

    fn fen(&self) -> String {
        self.state.get_fen()
    }

    fn shadow_copy(&self) -> Box<dyn RulesOracle> {
        Box::new(self.clone())
    }
}
