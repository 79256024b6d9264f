//! FEN-to-GameState parser.
//!
//! Builds fully-populated incremental state from a Forsyth-Edwards Notation
//! string, including piece bitboards, rights, clocks, occupancies and hash.

use crate::errors::RulesError;
use crate::game_state::{chess_types::*, game_state::GameState};
use crate::utils::algebraic::algebraic_to_square;

pub fn parse_fen(fen: &str) -> Result<GameState, RulesError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    let [board, side, castling, en_passant, halfmove, fullmove] = fields.as_slice() else {
        return Err(RulesError::Fen(format!(
            "expected 6 fields, found {}",
            fields.len()
        )));
    };

    let mut game_state = GameState::new_empty();

    parse_board(board, &mut game_state)?;
    game_state.side_to_move = match *side {
        "w" => Color::White,
        "b" => Color::Black,
        other => return Err(RulesError::Fen(format!("invalid side to move: {other}"))),
    };
    game_state.castling_rights = parse_castling_rights(castling)?;
    game_state.en_passant_square = match *en_passant {
        "-" => None,
        text => Some(algebraic_to_square(text)?),
    };
    game_state.halfmove_clock = halfmove
        .parse::<u16>()
        .map_err(|_| RulesError::Fen(format!("invalid halfmove clock: {halfmove}")))?;
    game_state.fullmove_number = fullmove
        .parse::<u16>()
        .map_err(|_| RulesError::Fen(format!("invalid fullmove number: {fullmove}")))?;

    game_state.finish_setup();
    Ok(game_state)
}

fn parse_board(board: &str, game_state: &mut GameState) -> Result<(), RulesError> {
    let ranks: Vec<&str> = board.split('/').collect();
    if ranks.len() != 8 {
        return Err(RulesError::Fen("board layout must contain 8 ranks".to_owned()));
    }

    for (fen_rank_idx, rank_str) in ranks.iter().enumerate() {
        let board_rank = 7 - fen_rank_idx as u8;
        let mut file = 0u8;

        for ch in rank_str.chars() {
            if let Some(empty_count) = ch.to_digit(10) {
                if !(1..=8).contains(&empty_count) {
                    return Err(RulesError::Fen(format!("invalid empty-square count '{ch}'")));
                }
                file += empty_count as u8;
                continue;
            }

            let (color, piece) = piece_from_fen_char(ch)
                .ok_or_else(|| RulesError::Fen(format!("invalid piece character '{ch}'")))?;
            if file >= 8 {
                return Err(RulesError::Fen("board rank has too many files".to_owned()));
            }
            game_state.set_piece(color, piece, board_rank * 8 + file);
            file += 1;
        }

        if file != 8 {
            return Err(RulesError::Fen("board rank does not sum to 8 files".to_owned()));
        }
    }

    Ok(())
}

fn parse_castling_rights(field: &str) -> Result<CastlingRights, RulesError> {
    if field == "-" {
        return Ok(0);
    }

    let mut rights: CastlingRights = 0;
    for ch in field.chars() {
        rights |= match ch {
            'K' => CASTLE_WHITE_KINGSIDE,
            'Q' => CASTLE_WHITE_QUEENSIDE,
            'k' => CASTLE_BLACK_KINGSIDE,
            'q' => CASTLE_BLACK_QUEENSIDE,
            _ => return Err(RulesError::Fen(format!("invalid castling character: {ch}"))),
        };
    }
    Ok(rights)
}

fn piece_from_fen_char(ch: char) -> Option<(Color, PieceKind)> {
    let color = if ch.is_ascii_uppercase() {
        Color::White
    } else {
        Color::Black
    };
    let piece = match ch.to_ascii_lowercase() {
        'p' => PieceKind::Pawn,
        'n' => PieceKind::Knight,
        'b' => PieceKind::Bishop,
        'r' => PieceKind::Rook,
        'q' => PieceKind::Queen,
        'k' => PieceKind::King,
        _ => return None,
    };
    Some((color, piece))
}
