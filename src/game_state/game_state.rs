//! Core incremental board state representation.
//!
//! `GameState` stores piece bitboards, occupancy caches, turn/state flags,
//! clocks, and the history stacks used by make/unmake and repetition checks.

use crate::errors::RulesError;
use crate::game_state::chess_types::*;
use crate::search::zobrist::compute_zobrist_key;
use crate::utils::fen_generator::generate_fen;
use crate::utils::fen_parser::parse_fen;

/// Incremental game state with a make/unmake history.
#[derive(Debug, Clone)]
pub struct GameState {
    // [color][piece_kind]
    pub pieces: [[u64; 6]; 2],

    pub occupancy_by_color: [u64; 2],
    pub occupancy_all: u64,

    pub side_to_move: Color,
    pub castling_rights: CastlingRights,
    pub en_passant_square: Option<SquareIndex>,

    pub halfmove_clock: u16,
    pub fullmove_number: u16,

    pub zobrist_key: u64,

    pub ply: u16,
    // Keys of every position reached since the last reset, current last.
    pub repetition_history: Vec<u64>,

    pub undo_stack: Vec<UndoState>,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            pieces: [[0; 6]; 2],
            occupancy_by_color: [0; 2],
            occupancy_all: 0,

            side_to_move: Color::White,
            castling_rights: 0,
            en_passant_square: None,

            halfmove_clock: 0,
            fullmove_number: 1,

            zobrist_key: 0,

            ply: 0,
            repetition_history: Vec::new(),
            undo_stack: Vec::new(),
        }
    }
}

impl GameState {
    #[inline]
    pub fn new_empty() -> Self {
        Self::default()
    }

    /// The standard starting layout, built directly from bitboards.
    pub fn new_game() -> Self {
        let mut game = Self::default();
        let white = Color::White.index();
        let black = Color::Black.index();

        game.pieces[white][PieceKind::Pawn.index()] = 0x0000_0000_0000_FF00;
        game.pieces[white][PieceKind::Knight.index()] = (1 << 1) | (1 << 6);
        game.pieces[white][PieceKind::Bishop.index()] = (1 << 2) | (1 << 5);
        game.pieces[white][PieceKind::Rook.index()] = 1 | (1 << 7);
        game.pieces[white][PieceKind::Queen.index()] = 1 << 3;
        game.pieces[white][PieceKind::King.index()] = 1 << 4;

        for kind in PieceKind::ALL {
            let bb = game.pieces[white][kind.index()];
            game.pieces[black][kind.index()] = if kind == PieceKind::Pawn {
                bb << 40
            } else {
                bb << 56
            };
        }

        game.castling_rights = CASTLE_WHITE_KINGSIDE
            | CASTLE_WHITE_QUEENSIDE
            | CASTLE_BLACK_KINGSIDE
            | CASTLE_BLACK_QUEENSIDE;
        game.finish_setup();
        game
    }

    #[inline]
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        parse_fen(fen)
    }

    #[inline]
    pub fn get_fen(&self) -> String {
        generate_fen(self)
    }

    /// Recompute caches and reset the history after the raw fields were set.
    pub fn finish_setup(&mut self) {
        self.recalc_occupancy();
        self.zobrist_key = compute_zobrist_key(self);
        self.ply = 0;
        self.undo_stack.clear();
        self.repetition_history.clear();
        self.repetition_history.push(self.zobrist_key);
    }

    pub fn recalc_occupancy(&mut self) {
        for color in Color::BOTH {
            self.occupancy_by_color[color.index()] = self.pieces[color.index()]
                .iter()
                .fold(0u64, |acc, bb| acc | bb);
        }
        self.occupancy_all = self.occupancy_by_color[0] | self.occupancy_by_color[1];
    }

    pub fn piece_at(&self, square: SquareIndex) -> Option<PieceRecord> {
        let mask = 1u64 << square;
        if self.occupancy_all & mask == 0 {
            return None;
        }
        for color in Color::BOTH {
            for kind in PieceKind::ALL {
                if self.pieces[color.index()][kind.index()] & mask != 0 {
                    return Some(PieceRecord::new(kind, color));
                }
            }
        }
        None
    }

    #[inline]
    pub fn king_square(&self, color: Color) -> Option<SquareIndex> {
        let kings = self.pieces[color.index()][PieceKind::King.index()];
        if kings == 0 {
            None
        } else {
            Some(kings.trailing_zeros() as SquareIndex)
        }
    }

    /// Piece counts over both colors, indexed by `PieceKind::index`.
    pub fn piece_counts(&self) -> [u32; 6] {
        let mut counts = [0u32; 6];
        for kind in PieceKind::ALL {
            counts[kind.index()] = self.pieces[0][kind.index()].count_ones()
                + self.pieces[1][kind.index()].count_ones();
        }
        counts
    }

    /// How many times the current position occurred since the last reset.
    pub fn repetition_count(&self) -> usize {
        self.repetition_history
            .iter()
            .filter(|key| **key == self.zobrist_key)
            .count()
    }

    #[inline]
    pub(crate) fn set_piece(&mut self, color: Color, kind: PieceKind, square: SquareIndex) {
        self.pieces[color.index()][kind.index()] |= 1u64 << square;
    }

    #[inline]
    pub(crate) fn clear_piece(&mut self, color: Color, kind: PieceKind, square: SquareIndex) {
        self.pieces[color.index()][kind.index()] &= !(1u64 << square);
    }
}

#[cfg(test)]
mod tests {
    use super::GameState;
    use crate::game_state::chess_rules::STARTING_POSITION_FEN;
    use crate::game_state::chess_types::{Color, PieceKind, PieceRecord};

    #[test]
    fn built_start_position_matches_starting_fen() {
        let built = GameState::new_game();
        let parsed = GameState::from_fen(STARTING_POSITION_FEN).expect("starting FEN should parse");
        assert_eq!(built.pieces, parsed.pieces);
        assert_eq!(built.castling_rights, parsed.castling_rights);
        assert_eq!(built.zobrist_key, parsed.zobrist_key);
        assert_eq!(built.get_fen(), STARTING_POSITION_FEN);
    }

    #[test]
    fn piece_lookup_and_counts() {
        let game = GameState::new_game();
        assert_eq!(
            game.piece_at(4),
            Some(PieceRecord::new(PieceKind::King, Color::White))
        );
        assert_eq!(game.piece_at(28), None);
        assert_eq!(game.piece_counts()[PieceKind::Pawn.index()], 16);
        assert_eq!(game.repetition_count(), 1);
    }
}
