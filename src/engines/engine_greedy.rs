use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::engines::engine_trait::Engine;
use crate::errors::EngineError;
use crate::game_state::chess_types::PieceKind;
use crate::moves::move_descriptions::{Move, MoveKind};
use crate::oracle::rules_oracle::{GameOutcome, RulesOracle};

const MATE_SCORE: i32 = 1_000_000;

/// One-ply material greedy engine: mates first, then the biggest capture or
/// promotion, ties broken at random.
pub struct GreedyEngine {
    rng: StdRng,
}

impl GreedyEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }

    fn score_move(oracle: &mut dyn RulesOracle, mv: Move) -> Result<i32, EngineError> {
        let mut score = match mv.kind() {
            Some(MoveKind::EnPassant) => PieceKind::Pawn.value(),
            _ => oracle.piece_at(mv.to()).map_or(0, |p| p.kind.value()),
        };
        if let Some(piece) = mv.promotion_piece() {
            score += piece.value() - PieceKind::Pawn.value();
        }

        oracle.apply_move(mv)?;
        let outcome = oracle.outcome();
        oracle.unapply_move(mv)?;
        match outcome? {
            GameOutcome::WhiteIsMated | GameOutcome::BlackIsMated => Ok(MATE_SCORE),
            GameOutcome::Playing => Ok(score),
            // Draws are worth nothing to the side that could still capture.
            _ => Ok(score.min(0)),
        }
    }
}

impl Default for GreedyEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Engine for GreedyEngine {
    fn name(&self) -> &str {
        "greedy"
    }

    fn choose_move(&mut self, oracle: &mut dyn RulesOracle) -> Result<Move, EngineError> {
        let legal_moves = oracle.legal_moves()?;
        if legal_moves.is_empty() {
            return Err(EngineError::NoLegalMoves);
        }

        let mut best_value = i32::MIN;
        let mut best_moves = Vec::new();
        for mv in legal_moves {
            let value = Self::score_move(oracle, mv)?;
            if value > best_value {
                best_value = value;
                best_moves.clear();
                best_moves.push(mv);
            } else if value == best_value {
                best_moves.push(mv);
            }
        }

        debug!(best_value, candidates = best_moves.len(), "greedy engine choosing");
        best_moves
            .as_slice()
            .choose(&mut self.rng)
            .copied()
            .ok_or(EngineError::NoLegalMoves)
    }
}
