//! Full legal move generation pipeline.
//!
//! Generates pseudo-legal moves piece by piece, then keeps the ones that do
//! not leave the mover's king attacked (checked with make/unmake on a scratch
//! copy). Promotions are emitted queen first so "first match by squares"
//! lookups default to a queen.

use crate::errors::RulesError;
use crate::game_state::{chess_types::*, game_state::GameState};
use crate::move_generation::legal_move_apply::{make_move, unmake_move};
use crate::move_generation::legal_move_checks::{is_king_in_check, is_square_attacked};
use crate::moves::attack_tables::{
    bishop_attacks, king_attacks, knight_attacks, pawn_attacks, queen_attacks, rook_attacks,
};
use crate::moves::move_descriptions::{Move, MoveKind};

const PROMOTION_ORDER: [PieceKind; 4] = [
    PieceKind::Queen,
    PieceKind::Knight,
    PieceKind::Rook,
    PieceKind::Bishop,
];

pub fn generate_legal_moves(game_state: &GameState) -> Result<Vec<Move>, RulesError> {
    let mut pseudo = Vec::<Move>::with_capacity(64);
    generate_pseudo_legal_moves(game_state, &mut pseudo);

    let mover = game_state.side_to_move;
    let mut scratch = game_state.clone();
    let mut legal = Vec::with_capacity(pseudo.len());
    for mv in pseudo {
        make_move(&mut scratch, mv)?;
        let exposes_king = is_king_in_check(&scratch, mover);
        unmake_move(&mut scratch)?;
        if !exposes_king {
            legal.push(mv);
        }
    }

    Ok(legal)
}

pub fn generate_pseudo_legal_moves(game_state: &GameState, out: &mut Vec<Move>) {
    let side = game_state.side_to_move;
    let own = game_state.occupancy_by_color[side.index()];
    let occ = game_state.occupancy_all;

    generate_pawn_moves(game_state, out);

    let ours = &game_state.pieces[side.index()];
    push_piece_moves(ours[PieceKind::Knight.index()], own, out, knight_attacks);
    push_piece_moves(ours[PieceKind::Bishop.index()], own, out, |sq| bishop_attacks(sq, occ));
    push_piece_moves(ours[PieceKind::Rook.index()], own, out, |sq| rook_attacks(sq, occ));
    push_piece_moves(ours[PieceKind::Queen.index()], own, out, |sq| queen_attacks(sq, occ));
    push_piece_moves(ours[PieceKind::King.index()], own, out, king_attacks);

    generate_castling_moves(game_state, out);
}

fn push_piece_moves(
    pieces: u64,
    own_occupancy: u64,
    out: &mut Vec<Move>,
    attacks: impl Fn(SquareIndex) -> u64,
) {
    let mut pieces = pieces;
    while pieces != 0 {
        let from = pieces.trailing_zeros() as SquareIndex;
        let mut targets = attacks(from) & !own_occupancy;
        while targets != 0 {
            let to = targets.trailing_zeros() as SquareIndex;
            out.push(Move::new(from, to, MoveKind::Standard));
            targets &= targets - 1;
        }
        pieces &= pieces - 1;
    }
}

fn generate_pawn_moves(game_state: &GameState, out: &mut Vec<Move>) {
    let side = game_state.side_to_move;
    let enemy_occ = game_state.occupancy_by_color[side.opposite().index()];
    let empty = !game_state.occupancy_all;
    let (forward, start_rank, promotion_rank): (i8, u8, u8) = match side {
        Color::White => (8, 1, 7),
        Color::Black => (-8, 6, 0),
    };

    let mut pawns = game_state.pieces[side.index()][PieceKind::Pawn.index()];
    while pawns != 0 {
        let from = pawns.trailing_zeros() as SquareIndex;
        pawns &= pawns - 1;

        let one_step = (from as i8 + forward) as SquareIndex;
        if empty & (1u64 << one_step) != 0 {
            push_pawn_move(out, from, one_step, promotion_rank);

            let two_step = (one_step as i8 + forward) as SquareIndex;
            if from / 8 == start_rank && empty & (1u64 << two_step) != 0 {
                out.push(Move::new(from, two_step, MoveKind::PawnDoubleStep));
            }
        }

        let mut captures = pawn_attacks(side, from) & enemy_occ;
        while captures != 0 {
            let to = captures.trailing_zeros() as SquareIndex;
            push_pawn_move(out, from, to, promotion_rank);
            captures &= captures - 1;
        }

        if let Some(ep) = game_state.en_passant_square {
            if pawn_attacks(side, from) & (1u64 << ep) != 0 {
                out.push(Move::new(from, ep, MoveKind::EnPassant));
            }
        }
    }
}

fn push_pawn_move(out: &mut Vec<Move>, from: SquareIndex, to: SquareIndex, promotion_rank: u8) {
    if to / 8 == promotion_rank {
        for piece in PROMOTION_ORDER {
            out.push(Move::new(from, to, MoveKind::Promotion(piece)));
        }
    } else {
        out.push(Move::new(from, to, MoveKind::Standard));
    }
}

fn generate_castling_moves(game_state: &GameState, out: &mut Vec<Move>) {
    let side = game_state.side_to_move;
    let enemy = side.opposite();
    let (king_from, kingside, queenside) = match side {
        Color::White => (4u8, CASTLE_WHITE_KINGSIDE, CASTLE_WHITE_QUEENSIDE),
        Color::Black => (60u8, CASTLE_BLACK_KINGSIDE, CASTLE_BLACK_QUEENSIDE),
    };
    if game_state.king_square(side) != Some(king_from)
        || is_square_attacked(game_state, king_from, enemy)
    {
        return;
    }

    // (right, squares that must be empty, king target)
    let options = [
        (kingside, [king_from + 1, king_from + 2, king_from + 2], king_from + 2),
        (queenside, [king_from - 1, king_from - 2, king_from - 3], king_from - 2),
    ];
    for (right, must_be_empty, target) in options {
        if game_state.castling_rights & right == 0 {
            continue;
        }
        if must_be_empty
            .iter()
            .any(|sq| game_state.occupancy_all & (1u64 << sq) != 0)
        {
            continue;
        }
        let crossed = [king_from, (king_from + target) / 2, target];
        if crossed
            .iter()
            .skip(1)
            .any(|sq| is_square_attacked(game_state, *sq, enemy))
        {
            continue;
        }
        out.push(Move::new(king_from, target, MoveKind::Castle));
    }
}

#[cfg(test)]
mod tests {
    use super::generate_legal_moves;
    use crate::game_state::chess_types::PieceKind;
    use crate::game_state::game_state::GameState;
    use crate::moves::move_descriptions::{Move, MoveKind};

    #[test]
    fn twenty_moves_from_the_start() {
        let game = GameState::new_game();
        let moves = generate_legal_moves(&game).expect("generation should succeed");
        assert_eq!(moves.len(), 20);
        assert!(moves.contains(&Move::new(12, 28, MoveKind::PawnDoubleStep)));
    }

    #[test]
    fn castling_through_attack_is_rejected() {
        // Black rook on f8 covers f1.
        let game =
            GameState::from_fen("5r1k/8/8/8/8/8/8/R3K2R w KQ - 0 1").expect("FEN should parse");
        let moves = generate_legal_moves(&game).expect("generation should succeed");
        assert!(!moves.contains(&Move::new(4, 6, MoveKind::Castle)));
        assert!(moves.contains(&Move::new(4, 2, MoveKind::Castle)));
    }

    #[test]
    fn promotions_are_listed_queen_first() {
        let game = GameState::from_fen("7k/4P3/8/8/8/8/8/4K3 w - - 0 1").expect("FEN should parse");
        let moves = generate_legal_moves(&game).expect("generation should succeed");
        let first = moves
            .iter()
            .find(|mv| mv.from() == 52 && mv.to() == 60)
            .expect("e7e8 should be legal");
        assert_eq!(first.kind(), Some(MoveKind::Promotion(PieceKind::Queen)));
    }

    #[test]
    fn checkmated_side_has_no_moves() {
        let game = GameState::from_fen("rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3")
            .expect("FEN should parse");
        assert!(generate_legal_moves(&game).expect("generation should succeed").is_empty());
    }
}
