//! Shared chess vocabulary: sides, piece kinds, board coordinates.
//!
//! Two coordinate systems coexist. The position model works on packed
//! `SquareIndex` values (`0..=63`, a1 = 0), while the session and the
//! presentation layer talk in 1-based `Square { file, rank }` pairs that also
//! carry the graveyard and invalid sentinels.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::RulesError;

pub use crate::game_state::game_state::GameState;
pub use crate::game_state::undo_state::UndoState;

/// Side of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub const BOTH: [Color; 2] = [Color::White, Color::Black];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Color::White => 0,
            Color::Black => 1,
        }
    }

    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => f.write_str("White"),
            Color::Black => f.write_str("Black"),
        }
    }
}

/// Piece kind (color is carried separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    pub const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            PieceKind::Pawn => 0,
            PieceKind::Knight => 1,
            PieceKind::Bishop => 2,
            PieceKind::Rook => 3,
            PieceKind::Queen => 4,
            PieceKind::King => 5,
        }
    }

    /// Conventional material weight in centipawns.
    #[inline]
    pub const fn value(self) -> i32 {
        match self {
            PieceKind::Pawn => 100,
            PieceKind::Knight => 320,
            PieceKind::Bishop => 330,
            PieceKind::Rook => 500,
            PieceKind::Queen => 900,
            PieceKind::King => 20_000,
        }
    }

    pub const fn fen_char(self, color: Color) -> char {
        let lower = match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
            PieceKind::King => 'k',
        };
        match color {
            Color::White => lower.to_ascii_uppercase(),
            Color::Black => lower,
        }
    }
}

/// Packed board square index (`0..=63`, a1 = 0, h8 = 63).
pub type SquareIndex = u8;

/// Compact castling rights bitmask.
pub type CastlingRights = u8;
pub const CASTLE_WHITE_KINGSIDE: CastlingRights = 1 << 0;
pub const CASTLE_WHITE_QUEENSIDE: CastlingRights = 1 << 1;
pub const CASTLE_BLACK_KINGSIDE: CastlingRights = 1 << 2;
pub const CASTLE_BLACK_QUEENSIDE: CastlingRights = 1 << 3;

/// A 1-based board coordinate, or one of the off-board sentinels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Square {
    pub file: i8,
    pub rank: i8,
}

impl Square {
    pub const ZERO: Square = Square { file: 0, rank: 0 };
    pub const INVALID: Square = Square { file: -1, rank: -1 };
    pub const BLACK_GRAVEYARD: Square = Square { file: -2, rank: -1 };
    pub const WHITE_GRAVEYARD: Square = Square { file: -2, rank: -2 };

    #[inline]
    pub const fn new(file: i8, rank: i8) -> Self {
        Self { file, rank }
    }

    #[inline]
    pub const fn is_valid(self) -> bool {
        self.file >= 1 && self.file <= 8 && self.rank >= 1 && self.rank <= 8
    }

    /// Packed index for a valid square.
    #[inline]
    pub const fn to_index(self) -> Option<SquareIndex> {
        if self.is_valid() {
            Some(((self.rank - 1) * 8 + (self.file - 1)) as SquareIndex)
        } else {
            None
        }
    }

    #[inline]
    pub const fn from_index(index: SquareIndex) -> Self {
        Self {
            file: (index % 8) as i8 + 1,
            rank: (index / 8) as i8 + 1,
        }
    }

    /// Graveyard sentinel that collects captured pieces of `color`.
    #[inline]
    pub const fn graveyard_of(color: Color) -> Self {
        match color {
            Color::White => Square::WHITE_GRAVEYARD,
            Color::Black => Square::BLACK_GRAVEYARD,
        }
    }

    pub fn parse(text: &str) -> Result<Self, RulesError> {
        let index = crate::utils::algebraic::algebraic_to_square(text)?;
        Ok(Self::from_index(index))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_index() {
            Some(index) => {
                let file = char::from(b'a' + index % 8);
                let rank = char::from(b'1' + index / 8);
                write!(f, "{file}{rank}")
            }
            None => write!(f, "({},{})", self.file, self.rank),
        }
    }
}

/// A piece identity independent of where it stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceRecord {
    pub kind: PieceKind,
    pub color: Color,
}

impl PieceRecord {
    #[inline]
    pub const fn new(kind: PieceKind, color: Color) -> Self {
        Self { kind, color }
    }
}
