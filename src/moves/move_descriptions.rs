//! Packed 16-bit move encoding.
//!
//! Layout: bits 0..5 start square, bits 6..11 target square, bits 12..15 a
//! kind tag. The all-zero value is reserved as the invalid move (a1 to a1 is
//! never legal). This packed value is exactly what travels in the replicated
//! move list.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::game_state::chess_types::{PieceKind, Square, SquareIndex};

const FROM_SHIFT: u16 = 0;
const TO_SHIFT: u16 = 6;
const TAG_SHIFT: u16 = 12;
const SQUARE_MASK: u16 = 0x3F;
const TAG_MASK: u16 = 0xF;

const TAG_STANDARD: u16 = 0;
const TAG_CASTLE: u16 = 1;
const TAG_EN_PASSANT: u16 = 2;
const TAG_PAWN_DOUBLE_STEP: u16 = 3;
const TAG_PROMOTE_QUEEN: u16 = 4;
const TAG_PROMOTE_KNIGHT: u16 = 5;
const TAG_PROMOTE_ROOK: u16 = 6;
const TAG_PROMOTE_BISHOP: u16 = 7;

/// Special-rule classification of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveKind {
    Standard,
    PawnDoubleStep,
    Castle,
    EnPassant,
    Promotion(PieceKind),
}

impl MoveKind {
    const fn tag(self) -> u16 {
        match self {
            MoveKind::Standard => TAG_STANDARD,
            MoveKind::Castle => TAG_CASTLE,
            MoveKind::EnPassant => TAG_EN_PASSANT,
            MoveKind::PawnDoubleStep => TAG_PAWN_DOUBLE_STEP,
            MoveKind::Promotion(PieceKind::Knight) => TAG_PROMOTE_KNIGHT,
            MoveKind::Promotion(PieceKind::Rook) => TAG_PROMOTE_ROOK,
            MoveKind::Promotion(PieceKind::Bishop) => TAG_PROMOTE_BISHOP,
            MoveKind::Promotion(_) => TAG_PROMOTE_QUEEN,
        }
    }

    const fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            TAG_STANDARD => Some(MoveKind::Standard),
            TAG_CASTLE => Some(MoveKind::Castle),
            TAG_EN_PASSANT => Some(MoveKind::EnPassant),
            TAG_PAWN_DOUBLE_STEP => Some(MoveKind::PawnDoubleStep),
            TAG_PROMOTE_QUEEN => Some(MoveKind::Promotion(PieceKind::Queen)),
            TAG_PROMOTE_KNIGHT => Some(MoveKind::Promotion(PieceKind::Knight)),
            TAG_PROMOTE_ROOK => Some(MoveKind::Promotion(PieceKind::Rook)),
            TAG_PROMOTE_BISHOP => Some(MoveKind::Promotion(PieceKind::Bishop)),
            _ => None,
        }
    }
}

/// A move as `(start, target, kind)` packed into its wire value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Move(u16);

impl Move {
    pub const INVALID: Move = Move(0);

    #[inline]
    pub const fn new(from: SquareIndex, to: SquareIndex, kind: MoveKind) -> Self {
        Move(
            ((from as u16 & SQUARE_MASK) << FROM_SHIFT)
                | ((to as u16 & SQUARE_MASK) << TO_SHIFT)
                | (kind.tag() << TAG_SHIFT),
        )
    }

    #[inline]
    pub const fn from_wire(raw: u16) -> Self {
        Move(raw)
    }

    #[inline]
    pub const fn wire(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn from(self) -> SquareIndex {
        ((self.0 >> FROM_SHIFT) & SQUARE_MASK) as SquareIndex
    }

    #[inline]
    pub const fn to(self) -> SquareIndex {
        ((self.0 >> TO_SHIFT) & SQUARE_MASK) as SquareIndex
    }

    /// Decoded kind; unknown tags decode as `None`.
    #[inline]
    pub const fn kind(self) -> Option<MoveKind> {
        MoveKind::from_tag((self.0 >> TAG_SHIFT) & TAG_MASK)
    }

    #[inline]
    pub const fn start_square(self) -> Square {
        Square::from_index(self.from())
    }

    #[inline]
    pub const fn target_square(self) -> Square {
        Square::from_index(self.to())
    }

    #[inline]
    pub const fn promotion_piece(self) -> Option<PieceKind> {
        match self.kind() {
            Some(MoveKind::Promotion(piece)) => Some(piece),
            _ => None,
        }
    }

    /// Same start and target squares, ignoring the kind tag.
    #[inline]
    pub const fn same_squares(self, other: Move) -> bool {
        self.from() == other.from() && self.to() == other.to()
    }

    /// Long algebraic text such as `e2e4` or `e7e8q`.
    pub fn to_long_algebraic(self) -> String {
        let mut out = format!("{}{}", self.start_square(), self.target_square());
        if let Some(piece) = self.promotion_piece() {
            out.push(piece.fen_char(crate::game_state::chess_types::Color::Black));
        }
        out
    }
}

impl Default for Move {
    fn default() -> Self {
        Move::INVALID
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            return f.write_str("Move(INVALID)");
        }
        write!(f, "Move({} {:?})", self.to_long_algebraic(), self.kind())
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            return f.write_str("0000");
        }
        f.write_str(&self.to_long_algebraic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn e2e4_packs_start_target_and_tag() {
        let mv = Move::new(12, 28, MoveKind::PawnDoubleStep);
        assert_eq!(mv.wire(), 12 | (28 << 6) | (3 << 12));
        assert_eq!(mv.start_square(), Square::new(5, 2));
        assert_eq!(mv.target_square(), Square::new(5, 4));
        assert_eq!(mv.kind(), Some(MoveKind::PawnDoubleStep));
        assert_eq!(mv.to_string(), "e2e4");
    }

    #[test]
    fn invalid_move_is_all_zero() {
        assert!(Move::INVALID.is_invalid());
        assert_eq!(Move::INVALID.wire(), 0);
        assert!(!Move::new(12, 20, MoveKind::Standard).is_invalid());
    }

    #[test]
    fn promotion_tags_distinguish_pieces() {
        let queen = Move::new(52, 60, MoveKind::Promotion(PieceKind::Queen));
        let knight = Move::new(52, 60, MoveKind::Promotion(PieceKind::Knight));
        assert_ne!(queen, knight);
        assert!(queen.same_squares(knight));
        assert_eq!(knight.promotion_piece(), Some(PieceKind::Knight));
        assert_eq!(queen.to_string(), "e7e8q");
    }

    #[test]
    fn unknown_tag_decodes_to_none() {
        let raw = Move::from_wire(12 | (28 << 6) | (0xE << 12));
        assert_eq!(raw.kind(), None);
    }
}
