use crate::game_state::{chess_types::*, game_state::GameState};
use crate::moves::attack_tables::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, rook_attacks,
};

#[inline]
pub fn is_king_in_check(game_state: &GameState, color: Color) -> bool {
    let Some(king_sq) = game_state.king_square(color) else {
        return false;
    };
    is_square_attacked(game_state, king_sq, color.opposite())
}

pub fn is_square_attacked(
    game_state: &GameState,
    square: SquareIndex,
    attacker_color: Color,
) -> bool {
    let theirs = &game_state.pieces[attacker_color.index()];

    // A pawn of the attacker attacks `square` iff a defender pawn on `square`
    // would attack the pawn's square.
    if pawn_attacks(attacker_color.opposite(), square) & theirs[PieceKind::Pawn.index()] != 0 {
        return true;
    }
    if knight_attacks(square) & theirs[PieceKind::Knight.index()] != 0 {
        return true;
    }
    if king_attacks(square) & theirs[PieceKind::King.index()] != 0 {
        return true;
    }

    let queens = theirs[PieceKind::Queen.index()];
    let diagonal = theirs[PieceKind::Bishop.index()] | queens;
    if bishop_attacks(square, game_state.occupancy_all) & diagonal != 0 {
        return true;
    }
    let straight = theirs[PieceKind::Rook.index()] | queens;
    rook_attacks(square, game_state.occupancy_all) & straight != 0
}
