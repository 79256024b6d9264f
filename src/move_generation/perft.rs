//! Perft node counting over make/unmake, used to validate the rules model.

use crate::errors::RulesError;
use crate::game_state::game_state::GameState;
use crate::move_generation::legal_move_apply::{make_move, unmake_move};
use crate::move_generation::legal_move_generator::generate_legal_moves;
use crate::moves::move_descriptions::MoveKind;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerftCounts {
    pub nodes: u64,
    pub captures: u64,
    pub en_passant: u64,
    pub castles: u64,
    pub promotions: u64,
}

pub fn perft(game_state: &GameState, depth: u8) -> Result<PerftCounts, RulesError> {
    let mut scratch = game_state.clone();
    let mut counts = PerftCounts::default();
    if depth == 0 {
        counts.nodes = 1;
        return Ok(counts);
    }
    perft_recurse(&mut scratch, depth, &mut counts)?;
    Ok(counts)
}

fn perft_recurse(
    game_state: &mut GameState,
    depth: u8,
    counts: &mut PerftCounts,
) -> Result<(), RulesError> {
    let moves = generate_legal_moves(game_state)?;
    for mv in moves {
        let is_capture = game_state.occupancy_all & (1u64 << mv.to()) != 0;
        let kind = mv.kind();
        make_move(game_state, mv)?;
        if depth == 1 {
            counts.nodes += 1;
            match kind {
                Some(MoveKind::EnPassant) => {
                    counts.captures += 1;
                    counts.en_passant += 1;
                }
                Some(MoveKind::Castle) => counts.castles += 1,
                Some(MoveKind::Promotion(_)) => {
                    counts.promotions += 1;
                    counts.captures += u64::from(is_capture);
                }
                _ => counts.captures += u64::from(is_capture),
            }
        } else {
            perft_recurse(game_state, depth - 1, counts)?;
        }
        unmake_move(game_state)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_node_counts() {
        let game = GameState::new_game();
        assert_eq!(perft(&game, 0).expect("perft should run").nodes, 1);
        assert_eq!(perft(&game, 1).expect("perft should run").nodes, 20);
        assert_eq!(perft(&game, 2).expect("perft should run").nodes, 400);
        assert_eq!(perft(&game, 3).expect("perft should run").nodes, 8902);
    }

    #[test]
    fn kiwipete_exercises_special_moves() {
        let game = GameState::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .expect("FEN should parse");
        let d1 = perft(&game, 1).expect("perft should run");
        assert_eq!(d1.nodes, 48);
        assert_eq!(d1.captures, 8);
        assert_eq!(d1.castles, 2);

        let d2 = perft(&game, 2).expect("perft should run");
        assert_eq!(d2.nodes, 2039);
        assert_eq!(d2.captures, 351);
        assert_eq!(d2.en_passant, 1);
        assert_eq!(d2.castles, 91);
    }

    #[test]
    fn endgame_position_three() {
        let game = GameState::from_fen("8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1")
            .expect("FEN should parse");
        assert_eq!(perft(&game, 3).expect("perft should run").nodes, 2812);
    }
}
