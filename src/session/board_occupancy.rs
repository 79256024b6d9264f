//! The session's own view of where every physical piece is.
//!
//! Pieces live in an arena with stable ids. Each id is in exactly one of the
//! board map, the white graveyard, the black graveyard or the hidden reserve.
//! The occupancy follows the oracle by replaying its `PieceChange` trail.

use std::collections::BTreeMap;

use tracing::{error, warn};

use crate::game_state::chess_types::{Color, PieceKind, PieceRecord, Square};
use crate::oracle::rules_oracle::PieceChange;
use crate::session::events::SessionEvent;

pub type PieceId = usize;

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceLocation {
    Board(Square),
    Graveyard(Color),
    Hidden,
}

#[derive(Debug, Clone)]
pub struct PieceSlot {
    pub record: PieceRecord,
    /// Starting square; reserve pieces have none.
    pub home: Option<Square>,
    pub location: PieceLocation,
    /// Created during play because no reserve piece was left.
    pub spawned: bool,
}

#[derive(Debug, Clone)]
pub struct BoardOccupancy {
    pieces: Vec<PieceSlot>,
    by_square: BTreeMap<Square, PieceId>,
    graveyards: [Vec<PieceId>; 2],
    hidden: Vec<PieceId>,
}

impl BoardOccupancy {
    /// The standard set plus `reserve_queens` hidden queens per side.
    pub fn new(reserve_queens: usize) -> Self {
        let mut pieces = Vec::with_capacity(32 + 2 * reserve_queens);
        for color in Color::BOTH {
            let (back, pawns) = match color {
                Color::White => (1, 2),
                Color::Black => (8, 7),
            };
            for (file, kind) in (1i8..=8).zip(BACK_RANK) {
                pieces.push(PieceSlot::at_home(kind, color, Square::new(file, back)));
            }
            for file in 1i8..=8 {
                pieces.push(PieceSlot::at_home(PieceKind::Pawn, color, Square::new(file, pawns)));
            }
            for _ in 0..reserve_queens {
                pieces.push(PieceSlot::reserve(PieceKind::Queen, color));
            }
        }

        let mut occupancy = Self {
            pieces,
            by_square: BTreeMap::new(),
            graveyards: [Vec::new(), Vec::new()],
            hidden: Vec::new(),
        };
        occupancy.reset();
        occupancy
    }

    /// Back to the starting layout. Returns how many spawned pieces were
    /// destroyed.
    pub fn reset(&mut self) -> usize {
        let before = self.pieces.len();
        // Spawned pieces are always appended after the base set, so base ids
        // stay stable.
        self.pieces.retain(|slot| !slot.spawned);
        let destroyed = before - self.pieces.len();

        self.by_square.clear();
        self.graveyards.iter_mut().for_each(Vec::clear);
        self.hidden.clear();

        for (id, slot) in self.pieces.iter_mut().enumerate() {
            match slot.home {
                Some(home) => {
                    slot.location = PieceLocation::Board(home);
                    self.by_square.insert(home, id);
                }
                None => {
                    slot.location = PieceLocation::Hidden;
                    self.hidden.push(id);
                }
            }
        }
        destroyed
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    pub fn piece(&self, id: PieceId) -> Option<&PieceSlot> {
        self.pieces.get(id)
    }

    pub fn piece_at(&self, square: Square) -> Option<(PieceId, &PieceSlot)> {
        let id = *self.by_square.get(&square)?;
        self.pieces.get(id).map(|slot| (id, slot))
    }

    pub fn occupied_squares(&self) -> impl Iterator<Item = (Square, PieceRecord)> + '_ {
        self.by_square
            .iter()
            .filter_map(|(square, id)| self.pieces.get(*id).map(|slot| (*square, slot.record)))
    }

    pub fn graveyard(&self, color: Color) -> &[PieceId] {
        &self.graveyards[color.index()]
    }

    pub fn hidden(&self) -> &[PieceId] {
        &self.hidden
    }

    pub fn pieces_on_board(&self, color: Color) -> usize {
        self.by_square
            .values()
            .filter(|id| self.pieces.get(**id).is_some_and(|p| p.record.color == color))
            .count()
    }

    pub fn spawned_count(&self) -> usize {
        self.pieces.iter().filter(|slot| slot.spawned).count()
    }

    pub fn apply_changes(&mut self, changes: &[PieceChange]) -> Vec<SessionEvent> {
        changes
            .iter()
            .filter_map(|change| self.apply_change(change))
            .collect()
    }

    pub fn apply_change(&mut self, change: &PieceChange) -> Option<SessionEvent> {
        match *change {
            PieceChange::Removed { square, piece } => {
                let square = Square::from_index(square);
                let Some(id) = self.by_square.remove(&square) else {
                    error!(%square, ?piece, "no piece to remove");
                    return None;
                };
                let to = self.add_to_graveyard(id);
                Some(SessionEvent::PieceRemoved {
                    id,
                    square,
                    to,
                    piece: self.pieces[id].record,
                })
            }
            PieceChange::Moved { from, to, piece } => {
                let from = Square::from_index(from);
                let to = Square::from_index(to);
                let Some(id) = self.by_square.remove(&from) else {
                    error!(%from, %to, ?piece, "no piece to move");
                    return None;
                };
                if let Some(occupant) = self.by_square.remove(&to) {
                    error!(%to, "move target still occupied");
                    self.add_to_graveyard(occupant);
                }
                self.by_square.insert(to, id);
                self.pieces[id].location = PieceLocation::Board(to);
                Some(SessionEvent::PieceMoved {
                    id,
                    from,
                    to,
                    piece: self.pieces[id].record,
                })
            }
            PieceChange::Added { square, piece } => {
                let square = Square::from_index(square);
                let (id, spawned) = match self.retrieve(piece) {
                    Some(id) => (id, false),
                    None => (self.spawn(piece), true),
                };
                if let Some(occupant) = self.by_square.insert(square, id) {
                    error!(%square, "added piece displaced an occupant");
                    self.add_to_graveyard(occupant);
                }
                self.pieces[id].location = PieceLocation::Board(square);
                Some(SessionEvent::PieceAdded {
                    id,
                    square,
                    piece,
                    spawned,
                })
            }
            PieceChange::Returned { square, piece } => {
                let square = Square::from_index(square);
                let Some(id) = self.by_square.remove(&square) else {
                    error!(%square, ?piece, "no promoted piece to return");
                    return None;
                };
                if self.pieces[id].home.is_some() {
                    // Drawn from the graveyard when it was promoted into.
                    let to = self.add_to_graveyard(id);
                    return Some(SessionEvent::PieceRemoved {
                        id,
                        square,
                        to,
                        piece: self.pieces[id].record,
                    });
                }
                self.hide(id);
                Some(SessionEvent::PieceHidden {
                    id,
                    square,
                    piece: self.pieces[id].record,
                })
            }
        }
    }

    /// Reserve stays ordered by id so retrieval after an undo picks the
    /// same piece again.
    fn hide(&mut self, id: PieceId) {
        match self.hidden.binary_search(&id) {
            Ok(_) => error!(id, "piece hidden twice"),
            Err(at) => self.hidden.insert(at, id),
        }
        self.pieces[id].location = PieceLocation::Hidden;
    }

    fn add_to_graveyard(&mut self, id: PieceId) -> Square {
        let color = self.pieces[id].record.color;
        let graveyard = &mut self.graveyards[color.index()];
        if graveyard.contains(&id) {
            error!(id, ?color, "piece added to graveyard twice");
        }
        graveyard.push(id);
        self.pieces[id].location = PieceLocation::Graveyard(color);
        Square::graveyard_of(color)
    }

    /// Most recently buried same-kind piece first, then the reserve.
    fn retrieve(&mut self, record: PieceRecord) -> Option<PieceId> {
        let graveyard = &mut self.graveyards[record.color.index()];
        if let Some(at) = graveyard
            .iter()
            .rposition(|id| self.pieces[*id].record.kind == record.kind)
        {
            return Some(graveyard.remove(at));
        }

        if let Some(at) = self
            .hidden
            .iter()
            .position(|id| self.pieces[*id].record == record)
        {
            return Some(self.hidden.remove(at));
        }

        warn!(?record, "no piece to retrieve");
        None
    }

    fn spawn(&mut self, record: PieceRecord) -> PieceId {
        self.pieces.push(PieceSlot {
            record,
            home: None,
            location: PieceLocation::Hidden,
            spawned: true,
        });
        self.pieces.len() - 1
    }

    /// Every piece is in exactly one container and its location agrees.
    pub fn check_invariants(&self) -> bool {
        let mut seen = vec![0u8; self.pieces.len()];
        let mut consistent = true;

        for (square, id) in &self.by_square {
            seen[*id] += 1;
            consistent &= self.pieces[*id].location == PieceLocation::Board(*square);
        }
        for color in Color::BOTH {
            for id in &self.graveyards[color.index()] {
                seen[*id] += 1;
                consistent &= self.pieces[*id].location == PieceLocation::Graveyard(color);
            }
        }
        for id in &self.hidden {
            seen[*id] += 1;
            consistent &= self.pieces[*id].location == PieceLocation::Hidden;
        }

        consistent && seen.iter().all(|count| *count == 1)
    }
}

impl PieceSlot {
    fn at_home(kind: PieceKind, color: Color, home: Square) -> Self {
        Self {
            record: PieceRecord::new(kind, color),
            home: Some(home),
            location: PieceLocation::Board(home),
            spawned: false,
        }
    }

    fn reserve(kind: PieceKind, color: Color) -> Self {
        Self {
            record: PieceRecord::new(kind, color),
            home: None,
            location: PieceLocation::Hidden,
            spawned: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game_state::chess_types::SquareIndex;

    fn idx(text: &str) -> SquareIndex {
        crate::utils::algebraic::algebraic_to_square(text).expect("square should parse")
    }

    fn rec(kind: PieceKind, color: Color) -> PieceRecord {
        PieceRecord::new(kind, color)
    }

    #[test]
    fn starting_layout_has_reserve_queens_hidden() {
        let occupancy = BoardOccupancy::new(1);
        assert_eq!(occupancy.len(), 34);
        assert_eq!(occupancy.hidden().len(), 2);
        assert_eq!(occupancy.pieces_on_board(Color::White), 16);
        let (_, king) = occupancy
            .piece_at(Square::parse("e8").expect("square"))
            .expect("e8 occupied");
        assert_eq!(king.record, rec(PieceKind::King, Color::Black));
        assert!(occupancy.check_invariants());
    }

    #[test]
    fn capture_and_undo_reuse_the_same_piece() {
        let mut occupancy = BoardOccupancy::new(0);
        let (victim, _) = occupancy
            .piece_at(Square::parse("d7").expect("square"))
            .expect("d7 occupied");

        let events = occupancy.apply_changes(&[
            PieceChange::Removed {
                square: idx("d7"),
                piece: rec(PieceKind::Pawn, Color::Black),
            },
            PieceChange::Moved {
                from: idx("e2"),
                to: idx("d7"),
                piece: rec(PieceKind::Pawn, Color::White),
            },
        ]);
        assert!(matches!(
            events[0],
            SessionEvent::PieceRemoved { id, to, .. } if id == victim && to == Square::BLACK_GRAVEYARD
        ));
        assert_eq!(occupancy.graveyard(Color::Black), &[victim]);
        assert!(occupancy.check_invariants());

        occupancy.apply_changes(&[
            PieceChange::Moved {
                from: idx("d7"),
                to: idx("e2"),
                piece: rec(PieceKind::Pawn, Color::White),
            },
            PieceChange::Added {
                square: idx("d7"),
                piece: rec(PieceKind::Pawn, Color::Black),
            },
        ]);
        let (restored, _) = occupancy
            .piece_at(Square::parse("d7").expect("square"))
            .expect("d7 occupied again");
        assert_eq!(restored, victim);
        assert!(occupancy.graveyard(Color::Black).is_empty());
        assert!(occupancy.check_invariants());
    }

    #[test]
    fn promotions_use_the_reserve_then_spawn() {
        let mut occupancy = BoardOccupancy::new(1);
        let promote = |file: &str| {
            [
                PieceChange::Removed {
                    square: idx(&format!("{file}2")),
                    piece: rec(PieceKind::Pawn, Color::White),
                },
                PieceChange::Added {
                    square: idx(&format!("{file}4")),
                    piece: rec(PieceKind::Queen, Color::White),
                },
            ]
        };

        let first = occupancy.apply_changes(&promote("a"));
        assert!(matches!(first[1], SessionEvent::PieceAdded { spawned: false, .. }));
        let second = occupancy.apply_changes(&promote("b"));
        assert!(matches!(second[1], SessionEvent::PieceAdded { spawned: true, .. }));
        assert_eq!(occupancy.spawned_count(), 1);
        assert!(occupancy.check_invariants());

        assert_eq!(occupancy.reset(), 1);
        assert_eq!(occupancy.len(), 34);
        assert_eq!(occupancy.hidden().len(), 2);
        assert!(occupancy.check_invariants());
    }

    #[test]
    fn double_graveyard_add_is_reported_and_proceeds() {
        let mut occupancy = BoardOccupancy::new(0);
        let (id, _) = occupancy
            .piece_at(Square::parse("a7").expect("square"))
            .expect("a7 occupied");
        occupancy.by_square.remove(&Square::parse("a7").expect("square"));
        occupancy.add_to_graveyard(id);
        occupancy.add_to_graveyard(id);
        assert_eq!(occupancy.graveyard(Color::Black), &[id, id]);
        assert_eq!(
            occupancy.piece(id).map(|slot| slot.location),
            Some(PieceLocation::Graveyard(Color::Black))
        );
        assert!(!occupancy.check_invariants());
    }

    #[test]
    fn undone_promotion_returns_the_queen_to_the_reserve() {
        let mut occupancy = BoardOccupancy::new(1);
        let hidden_before = occupancy.hidden().to_vec();
        let (rook, _) = occupancy
            .piece_at(Square::parse("h8").expect("square"))
            .expect("h8 occupied");
        occupancy.apply_changes(&[
            PieceChange::Removed {
                square: idx("h7"),
                piece: rec(PieceKind::Pawn, Color::Black),
            },
            PieceChange::Removed {
                square: idx("g2"),
                piece: rec(PieceKind::Pawn, Color::White),
            },
            PieceChange::Moved {
                from: idx("h1"),
                to: idx("g2"),
                piece: rec(PieceKind::Rook, Color::White),
            },
        ]);
        let pawn_graveyard = occupancy.graveyard(Color::White).to_vec();

        let promoted = occupancy.apply_changes(&[
            PieceChange::Removed {
                square: idx("h8"),
                piece: rec(PieceKind::Rook, Color::Black),
            },
            PieceChange::Removed {
                square: idx("a2"),
                piece: rec(PieceKind::Pawn, Color::White),
            },
            PieceChange::Added {
                square: idx("h8"),
                piece: rec(PieceKind::Queen, Color::White),
            },
        ]);
        let SessionEvent::PieceAdded { id: queen, spawned: false, .. } = promoted[2] else {
            panic!("expected a reserve queen, got {:?}", promoted[2]);
        };
        assert_eq!(occupancy.graveyard(Color::White).len(), 2);

        let undone = occupancy.apply_changes(&[
            PieceChange::Returned {
                square: idx("h8"),
                piece: rec(PieceKind::Queen, Color::White),
            },
            PieceChange::Added {
                square: idx("a2"),
                piece: rec(PieceKind::Pawn, Color::White),
            },
            PieceChange::Added {
                square: idx("h8"),
                piece: rec(PieceKind::Rook, Color::Black),
            },
        ]);
        assert!(matches!(undone[0], SessionEvent::PieceHidden { id, .. } if id == queen));
        assert_eq!(occupancy.hidden(), hidden_before.as_slice());
        assert_eq!(occupancy.graveyard(Color::White), pawn_graveyard.as_slice());
        assert_eq!(
            occupancy.piece_at(Square::parse("h8").expect("square")).map(|(id, _)| id),
            Some(rook)
        );
        assert!(occupancy.check_invariants());
    }
}
