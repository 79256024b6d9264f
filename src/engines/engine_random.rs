//! Uniform random-move engine, mostly for diagnostics and soak tests.

use rand::prelude::IndexedRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::debug;

use crate::engines::engine_trait::Engine;
use crate::errors::EngineError;
use crate::moves::move_descriptions::Move;
use crate::oracle::rules_oracle::RulesOracle;

pub struct RandomEngine {
    rng: StdRng,
}

impl RandomEngine {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { rng }
    }
}

impl Default for RandomEngine {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Engine for RandomEngine {
    fn name(&self) -> &str {
        "random"
    }

    fn choose_move(&mut self, oracle: &mut dyn RulesOracle) -> Result<Move, EngineError> {
        let legal_moves = oracle.legal_moves()?;
        debug!(legal_moves = legal_moves.len(), "random engine choosing");
        legal_moves
            .as_slice()
            .choose(&mut self.rng)
            .copied()
            .ok_or(EngineError::NoLegalMoves)
    }
}
