//! PGN read/write for the move ledger.
//!
//! Movetext uses long algebraic tokens (`e2e4`, `e7e8q`) so a ledger can be
//! written without SAN disambiguation and read back by replaying each token
//! against the rules oracle.

use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::errors::RulesError;
use crate::game_state::chess_rules::STARTING_POSITION_FEN;
use crate::game_state::chess_types::{Color, PieceKind};
use crate::moves::move_descriptions::Move;
use crate::oracle::rules_oracle::{RulesOracle, StandardRules};
use crate::utils::algebraic::algebraic_to_square;

#[derive(Debug, Clone)]
pub struct PgnGame {
    pub headers: BTreeMap<String, String>,
    pub initial: StandardRules,
    pub moves: Vec<Move>,
    pub final_position: StandardRules,
    pub result: String,
}

/// Result token for a game where `loser` (if any) has lost.
pub fn result_for_loser(loser: Option<Color>) -> &'static str {
    match loser {
        Some(Color::White) => "0-1",
        Some(Color::Black) => "1-0",
        None => "*",
    }
}

pub fn write_pgn(
    initial: &dyn RulesOracle,
    moves: &[Move],
    result: &str,
    date: NaiveDate,
) -> Result<String, RulesError> {
    let mut headers = BTreeMap::<String, String>::new();
    headers.insert("Event".to_owned(), "Tabletop Chess Game".to_owned());
    headers.insert("Site".to_owned(), "Shared Board".to_owned());
    headers.insert("Date".to_owned(), date.format("%Y.%m.%d").to_string());
    headers.insert("Round".to_owned(), "-".to_owned());
    headers.insert("White".to_owned(), "White".to_owned());
    headers.insert("Black".to_owned(), "Black".to_owned());
    headers.insert("Result".to_owned(), normalize_result(result).to_owned());

    let initial_fen = initial.fen();
    if initial_fen != STARTING_POSITION_FEN {
        headers.insert("SetUp".to_owned(), "1".to_owned());
        headers.insert("FEN".to_owned(), initial_fen);
    }

    write_pgn_with_headers(initial, moves, &headers)
}

/// Write `moves` after checking each one is legal from `initial`.
pub fn write_pgn_with_headers(
    initial: &dyn RulesOracle,
    moves: &[Move],
    headers: &BTreeMap<String, String>,
) -> Result<String, RulesError> {
    let mut out = String::new();
    for (key, value) in headers {
        out.push_str(&format!("[{} \"{}\"]\n", key, escape_pgn_value(value)));
    }
    out.push('\n');

    let mut replay = initial.shadow_copy();
    let mut movetext = Vec::<String>::with_capacity(moves.len() + 1);
    for (ply, mv) in moves.iter().enumerate() {
        let legal = replay.match_wire_move(*mv)?;
        if legal.is_invalid() {
            return Err(RulesError::IllegalMove(mv.wire()));
        }
        let lan = legal.to_long_algebraic();
        if ply % 2 == 0 {
            movetext.push(format!("{}. {}", (ply / 2) + 1, lan));
        } else {
            movetext.push(lan);
        }
        replay.apply_move(legal)?;
    }

    let result = headers
        .get("Result")
        .map(|x| normalize_result(x))
        .unwrap_or("*");
    movetext.push(result.to_owned());
    out.push_str(&movetext.join(" "));
    out.push('\n');
    Ok(out)
}

pub fn read_pgn(pgn: &str) -> Result<PgnGame, RulesError> {
    let mut headers = BTreeMap::<String, String>::new();
    let mut movetext_lines = Vec::<&str>::new();

    for line in pgn.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with('[') {
            let (k, v) = parse_header_line(trimmed)?;
            headers.insert(k, v);
        } else {
            movetext_lines.push(trimmed);
        }
    }

    let initial = if headers.get("SetUp").map(|x| x.as_str()) == Some("1") {
        let fen = headers
            .get("FEN")
            .ok_or_else(|| RulesError::Pgn("SetUp is 1 but the FEN header is missing".to_owned()))?;
        StandardRules::from_fen(fen)?
    } else {
        StandardRules::new()
    };

    let mut position = initial.clone();
    let mut moves = Vec::<Move>::new();
    let mut result = "*".to_owned();

    let movetext = strip_pgn_comments_and_variations(&movetext_lines.join(" "));
    for token in movetext.split_whitespace() {
        if is_move_number_token(token) {
            continue;
        }
        let cleaned = trim_annotation_suffix(token);
        if is_result_token(cleaned) {
            result = cleaned.to_owned();
            break;
        }
        let mv = parse_long_algebraic(cleaned, &position)?;
        position.apply_move(mv)?;
        moves.push(mv);
    }

    if let Some(header_result) = headers.get("Result") {
        result = normalize_result(header_result).to_owned();
    }

    Ok(PgnGame {
        headers,
        initial,
        moves,
        final_position: position,
        result,
    })
}

/// Resolve a long algebraic token against the legal moves of `oracle`.
pub fn parse_long_algebraic(token: &str, oracle: &dyn RulesOracle) -> Result<Move, RulesError> {
    let bad = || RulesError::Pgn(format!("bad move token `{token}`"));
    if !(4..=5).contains(&token.len()) || !token.is_ascii() {
        return Err(bad());
    }
    let from = algebraic_to_square(&token[0..2])?;
    let to = algebraic_to_square(&token[2..4])?;
    let promotion = match token.as_bytes().get(4) {
        None => None,
        Some(b'q') => Some(PieceKind::Queen),
        Some(b'n') => Some(PieceKind::Knight),
        Some(b'r') => Some(PieceKind::Rook),
        Some(b'b') => Some(PieceKind::Bishop),
        Some(_) => return Err(bad()),
    };

    oracle
        .legal_moves()?
        .into_iter()
        .find(|mv| mv.from() == from && mv.to() == to && mv.promotion_piece() == promotion)
        .ok_or_else(|| RulesError::Pgn(format!("`{token}` is not legal here")))
}

fn parse_header_line(line: &str) -> Result<(String, String), RulesError> {
    let invalid = || RulesError::Pgn(format!("invalid header line: {line}"));
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(invalid)?;
    let (key, value_raw) = inner.split_once(' ').ok_or_else(invalid)?;
    let value = value_raw
        .trim()
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .ok_or_else(invalid)?;
    Ok((key.trim().to_owned(), value.replace("\\\"", "\"")))
}

fn strip_pgn_comments_and_variations(text: &str) -> String {
    let mut out = String::new();
    let mut brace_depth = 0usize;
    let mut paren_depth = 0usize;

    for ch in text.chars() {
        match ch {
            '{' => brace_depth = brace_depth.saturating_add(1),
            '}' => brace_depth = brace_depth.saturating_sub(1),
            '(' => paren_depth = paren_depth.saturating_add(1),
            ')' => paren_depth = paren_depth.saturating_sub(1),
            _ if brace_depth == 0 && paren_depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

fn is_move_number_token(token: &str) -> bool {
    let digits = token.trim_end_matches('.');
    digits.len() < token.len() && !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn trim_annotation_suffix(token: &str) -> &str {
    token.trim_end_matches(|c: char| matches!(c, '+' | '#' | '!' | '?'))
}

fn is_result_token(token: &str) -> bool {
    matches!(token, "1-0" | "0-1" | "1/2-1/2" | "*")
}

fn normalize_result(result: &str) -> &str {
    if is_result_token(result) {
        result
    } else {
        "*"
    }
}

fn escape_pgn_value(value: &str) -> String {
    value.replace('"', "\\\"")
}
