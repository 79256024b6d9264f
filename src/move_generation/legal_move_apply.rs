//! In-place make/unmake with a piece-change trail.
//!
//! Every mutation reports the occupancy edits it performed so a caller that
//! mirrors the board (for example the session's piece arena) can follow
//! along without re-deriving castling, en passant or promotion itself.

use crate::errors::RulesError;
use crate::game_state::{chess_types::*, game_state::GameState};
use crate::moves::move_descriptions::{Move, MoveKind};
use crate::search::zobrist::compute_zobrist_key;

/// One occupancy edit, in the order it must be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceChange {
    Removed {
        square: SquareIndex,
        piece: PieceRecord,
    },
    Moved {
        from: SquareIndex,
        to: SquareIndex,
        piece: PieceRecord,
    },
    Added {
        square: SquareIndex,
        piece: PieceRecord,
    },
    /// A promoted piece leaving the board on undo. It goes back to wherever
    /// it was drawn from rather than to the graveyard.
    Returned {
        square: SquareIndex,
        piece: PieceRecord,
    },
}

pub fn make_move(game_state: &mut GameState, mv: Move) -> Result<Vec<PieceChange>, RulesError> {
    let kind = mv.kind().ok_or(RulesError::IllegalMove(mv.wire()))?;
    let from = mv.from();
    let to = mv.to();
    let mover = game_state.side_to_move;
    let enemy = mover.opposite();

    let moved_piece = game_state
        .piece_at(from)
        .filter(|p| p.color == mover)
        .ok_or(RulesError::NoPieceOnSquare(from))?
        .kind;

    let captured_square = if kind == MoveKind::EnPassant {
        Some(en_passant_victim_square(mover, to).ok_or(RulesError::IllegalMove(mv.wire()))?)
    } else {
        Some(to)
    };
    let captured = captured_square.and_then(|sq| {
        game_state
            .piece_at(sq)
            .filter(|p| p.color == enemy)
            .map(|p| (sq, p.kind))
    });

    let rook_squares = if kind == MoveKind::Castle {
        Some(castle_rook_squares(to).ok_or(RulesError::IllegalMove(mv.wire()))?)
    } else {
        None
    };

    game_state.undo_stack.push(UndoState {
        mv,
        moved_piece,
        captured_piece: captured.map(|(_, kind)| kind),
        captured_square: captured.map(|(sq, _)| sq),
        prev_castling_rights: game_state.castling_rights,
        prev_en_passant_square: game_state.en_passant_square,
        prev_halfmove_clock: game_state.halfmove_clock,
        prev_fullmove_number: game_state.fullmove_number,
        prev_zobrist_key: game_state.zobrist_key,
    });

    let mut changes = Vec::with_capacity(3);

    if let Some((square, kind)) = captured {
        game_state.clear_piece(enemy, kind, square);
        changes.push(PieceChange::Removed {
            square,
            piece: PieceRecord::new(kind, enemy),
        });
    }

    match kind {
        MoveKind::Promotion(promoted) => {
            game_state.clear_piece(mover, PieceKind::Pawn, from);
            game_state.set_piece(mover, promoted, to);
            changes.push(PieceChange::Removed {
                square: from,
                piece: PieceRecord::new(PieceKind::Pawn, mover),
            });
            changes.push(PieceChange::Added {
                square: to,
                piece: PieceRecord::new(promoted, mover),
            });
        }
        _ => {
            game_state.clear_piece(mover, moved_piece, from);
            game_state.set_piece(mover, moved_piece, to);
            changes.push(PieceChange::Moved {
                from,
                to,
                piece: PieceRecord::new(moved_piece, mover),
            });

            if let Some((rook_from, rook_to)) = rook_squares {
                game_state.clear_piece(mover, PieceKind::Rook, rook_from);
                game_state.set_piece(mover, PieceKind::Rook, rook_to);
                changes.push(PieceChange::Moved {
                    from: rook_from,
                    to: rook_to,
                    piece: PieceRecord::new(PieceKind::Rook, mover),
                });
            }
        }
    }

    update_castling_rights(game_state, from, to);

    game_state.en_passant_square = if kind == MoveKind::PawnDoubleStep {
        Some((from + to) / 2)
    } else {
        None
    };

    if moved_piece == PieceKind::Pawn || captured.is_some() {
        game_state.halfmove_clock = 0;
    } else {
        game_state.halfmove_clock = game_state.halfmove_clock.saturating_add(1);
    }
    if mover == Color::Black {
        game_state.fullmove_number = game_state.fullmove_number.saturating_add(1);
    }

    game_state.side_to_move = enemy;
    game_state.ply = game_state.ply.saturating_add(1);
    game_state.recalc_occupancy();
    game_state.zobrist_key = compute_zobrist_key(game_state);
    game_state.repetition_history.push(game_state.zobrist_key);

    Ok(changes)
}

/// Revert the most recent `make_move`, reporting the inverse edits.
pub fn unmake_move(game_state: &mut GameState) -> Result<Vec<PieceChange>, RulesError> {
    let undo = game_state.undo_stack.pop().ok_or(RulesError::EmptyHistory)?;
    game_state.repetition_history.pop();

    let mv = undo.mv;
    let from = mv.from();
    let to = mv.to();
    let mover = game_state.side_to_move.opposite();
    let mut changes = Vec::with_capacity(3);

    match mv.kind() {
        Some(MoveKind::Promotion(promoted)) => {
            game_state.clear_piece(mover, promoted, to);
            game_state.set_piece(mover, PieceKind::Pawn, from);
            changes.push(PieceChange::Returned {
                square: to,
                piece: PieceRecord::new(promoted, mover),
            });
            changes.push(PieceChange::Added {
                square: from,
                piece: PieceRecord::new(PieceKind::Pawn, mover),
            });
        }
        kind => {
            game_state.clear_piece(mover, undo.moved_piece, to);
            game_state.set_piece(mover, undo.moved_piece, from);
            changes.push(PieceChange::Moved {
                from: to,
                to: from,
                piece: PieceRecord::new(undo.moved_piece, mover),
            });

            if kind == Some(MoveKind::Castle) {
                if let Some((rook_from, rook_to)) = castle_rook_squares(to) {
                    game_state.clear_piece(mover, PieceKind::Rook, rook_to);
                    game_state.set_piece(mover, PieceKind::Rook, rook_from);
                    changes.push(PieceChange::Moved {
                        from: rook_to,
                        to: rook_from,
                        piece: PieceRecord::new(PieceKind::Rook, mover),
                    });
                }
            }
        }
    }

    if let (Some(kind), Some(square)) = (undo.captured_piece, undo.captured_square) {
        let enemy = mover.opposite();
        game_state.set_piece(enemy, kind, square);
        changes.push(PieceChange::Added {
            square,
            piece: PieceRecord::new(kind, enemy),
        });
    }

    game_state.side_to_move = mover;
    game_state.castling_rights = undo.prev_castling_rights;
    game_state.en_passant_square = undo.prev_en_passant_square;
    game_state.halfmove_clock = undo.prev_halfmove_clock;
    game_state.fullmove_number = undo.prev_fullmove_number;
    game_state.zobrist_key = undo.prev_zobrist_key;
    game_state.ply = game_state.ply.saturating_sub(1);
    game_state.recalc_occupancy();

    Ok(changes)
}

#[inline]
fn en_passant_victim_square(mover: Color, to: SquareIndex) -> Option<SquareIndex> {
    match mover {
        Color::White => to.checked_sub(8),
        Color::Black => to.checked_add(8).filter(|sq| *sq < 64),
    }
}

/// Rook `(from, to)` for a castling king landing on `king_to`.
#[inline]
pub fn castle_rook_squares(king_to: SquareIndex) -> Option<(SquareIndex, SquareIndex)> {
    match king_to {
        6 => Some((7, 5)),
        2 => Some((0, 3)),
        62 => Some((63, 61)),
        58 => Some((56, 59)),
        _ => None,
    }
}

fn update_castling_rights(game_state: &mut GameState, from: SquareIndex, to: SquareIndex) {
    for square in [from, to] {
        game_state.castling_rights &= match square {
            0 => !CASTLE_WHITE_QUEENSIDE,
            4 => !(CASTLE_WHITE_KINGSIDE | CASTLE_WHITE_QUEENSIDE),
            7 => !CASTLE_WHITE_KINGSIDE,
            56 => !CASTLE_BLACK_QUEENSIDE,
            60 => !(CASTLE_BLACK_KINGSIDE | CASTLE_BLACK_QUEENSIDE),
            63 => !CASTLE_BLACK_KINGSIDE,
            _ => !0,
        };
    }
}
