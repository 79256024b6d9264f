//! Square conversions for algebraic coordinates such as `e4`.

use crate::errors::RulesError;
use crate::game_state::chess_types::SquareIndex;

/// Convert algebraic text (for example "e4") to a packed square index.
#[inline]
pub fn algebraic_to_square(square: &str) -> Result<SquareIndex, RulesError> {
    let &[file, rank] = square.as_bytes() else {
        return Err(RulesError::SquareText(square.to_owned()));
    };
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return Err(RulesError::SquareText(square.to_owned()));
    }
    Ok((rank - b'1') * 8 + (file - b'a'))
}

/// Convert a packed square index to algebraic text.
#[inline]
pub fn square_to_algebraic(square: SquareIndex) -> Result<String, RulesError> {
    if square > 63 {
        return Err(RulesError::SquareText(format!("index {square}")));
    }
    let file = char::from(b'a' + square % 8);
    let rank = char::from(b'1' + square / 8);
    Ok(format!("{file}{rank}"))
}
