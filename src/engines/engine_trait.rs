//! Engine abstraction used by the computer-opponent driver.
//!
//! Engines search a private shadow copy of the rules oracle, so they may
//! apply and unapply moves freely without disturbing the live session.

use serde::{Deserialize, Serialize};

use crate::engines::engine_greedy::GreedyEngine;
use crate::engines::engine_random::RandomEngine;
use crate::errors::EngineError;
use crate::moves::move_descriptions::Move;
use crate::oracle::rules_oracle::RulesOracle;

pub trait Engine: Send {
    fn name(&self) -> &str;

    fn new_game(&mut self) {}

    fn choose_move(&mut self, oracle: &mut dyn RulesOracle) -> Result<Move, EngineError>;
}

/// Engine selection as it appears in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Random,
    #[default]
    Greedy,
}

pub fn build_engine(kind: EngineKind, seed: Option<u64>) -> Box<dyn Engine> {
    match kind {
        EngineKind::Random => Box::new(RandomEngine::new(seed)),
        EngineKind::Greedy => Box::new(GreedyEngine::new(seed)),
    }
}
