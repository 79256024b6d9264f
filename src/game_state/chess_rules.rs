//! Canonical chess-rule constants.
//!
//! Starting layout plus the thresholds used when classifying how a game ends.

/// Standard chess starting position in Forsyth-Edwards Notation (FEN).
pub const STARTING_POSITION_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Halfmove clock value at which the fifty-move rule ends the game.
pub const FIFTY_MOVE_RULE_HALFMOVES: u16 = 100;

/// Number of occurrences of the same position that ends the game by repetition.
pub const REPETITION_LIMIT: usize = 3;
