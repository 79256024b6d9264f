use crate::game_state::chess_types::*;
use crate::moves::move_descriptions::Move;

/// Everything `unmake_move` needs to restore the position before `mv`.
#[derive(Debug, Clone)]
pub struct UndoState {
    pub mv: Move,
    pub moved_piece: PieceKind,
    pub captured_piece: Option<PieceKind>,
    pub captured_square: Option<SquareIndex>,

    pub prev_castling_rights: CastlingRights,
    pub prev_en_passant_square: Option<SquareIndex>,
    pub prev_halfmove_clock: u16,
    pub prev_fullmove_number: u16,
    pub prev_zobrist_key: u64,
}
