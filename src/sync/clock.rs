//! Per-side countdown with local prediction.
//!
//! Every participant counts the side to move down on its own frame clock.
//! The board owner publishes a `ClockSnapshot` at move boundaries and the
//! observers overwrite their prediction with it.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::game_state::chess_types::Color;

/// Remaining seconds for both sides.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub white: f64,
    pub black: f64,
}

impl ClockSnapshot {
    pub fn uniform(seconds: f64) -> Self {
        Self {
            white: seconds,
            black: seconds,
        }
    }

    pub fn remaining(&self, color: Color) -> f64 {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    fn remaining_mut(&mut self, color: Color) -> &mut f64 {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClockSynchronizer {
    state: ClockSnapshot,
}

impl ClockSynchronizer {
    pub fn new(seconds: f64) -> Self {
        Self {
            state: ClockSnapshot::uniform(seconds),
        }
    }

    pub fn reset(&mut self, seconds: f64) {
        self.state = ClockSnapshot::uniform(seconds);
    }

    #[inline]
    pub fn remaining(&self, color: Color) -> f64 {
        self.state.remaining(color)
    }

    #[inline]
    pub fn snapshot(&self) -> ClockSnapshot {
        self.state
    }

    /// Take an authoritative value over the local prediction.
    pub fn overwrite(&mut self, snapshot: ClockSnapshot) {
        self.state = snapshot;
    }

    /// Count the side to move down by `dt`.
    ///
    /// Nothing runs without time control, without a side to move, or once a
    /// player has lost. Returns the side whose flag fell on this tick.
    pub fn tick(
        &mut self,
        dt: f64,
        turn: Option<Color>,
        time_control: bool,
        player_lost: Option<Color>,
    ) -> Option<Color> {
        if !time_control || player_lost.is_some() {
            return None;
        }
        let color = turn?;

        let remaining = self.state.remaining_mut(color);
        *remaining = (*remaining - dt.max(0.0)).max(0.0);
        if *remaining <= 0.0 {
            info!(%color, "clock expired");
            return Some(color);
        }
        None
    }
}
