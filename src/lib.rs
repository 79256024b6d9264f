//! Crate root module declarations for the tabletop chess board.
//!
//! The rules model (game state, move generation, the rules oracle and the
//! computer opponents) sits below the replication layer (ownership, the move
//! ledger, the clock), and the session modules tie both together into one
//! participant's view of a shared board.

pub mod config;
pub mod errors;

pub mod game_state {
    pub mod chess_rules;
    pub mod chess_types;
    pub mod game_state;
    pub mod undo_state;
}

pub mod moves {
    pub mod attack_tables;
    pub mod move_descriptions;
}

pub mod move_generation {
    pub mod legal_move_apply;
    pub mod legal_move_checks;
    pub mod legal_move_generator;
    pub mod perft;
}

pub mod search {
    pub mod zobrist;
}

pub mod oracle {
    pub mod rules_oracle;
}

pub mod engines {
    pub mod engine_greedy;
    pub mod engine_random;
    pub mod engine_trait;
    pub mod opponent_driver;
}

pub mod sync {
    pub mod channel_transport;
    pub mod clock;
    pub mod local_network;
    pub mod move_ledger;
    pub mod ownership;
    pub mod replicated_var;
    pub mod scheduler;
    pub mod transport;
}

pub mod session {
    pub mod board_occupancy;
    pub mod chess_session;
    pub mod events;
    pub mod network_board;
    pub mod options;
}

pub mod utils {
    pub mod algebraic;
    pub mod fen_generator;
    pub mod fen_parser;
    pub mod pgn;
}
