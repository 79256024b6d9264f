//! Game options, modes and the replicated board-state message.

use serde::{Deserialize, Serialize};

use crate::game_state::chess_types::Color;

/// Seconds per side for each time-amount index.
pub const TIME_AMOUNTS_S: [f64; 4] = [300.0, 600.0, 1200.0, 2400.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionState {
    pub slide_board: bool,
    pub show_legal_moves: bool,
    pub play_sound_fx: bool,
    pub time_control: bool,
    pub time_amount_index: u8,
    pub press_confirm: bool,
}

impl Default for OptionState {
    fn default() -> Self {
        Self {
            slide_board: false,
            show_legal_moves: true,
            play_sound_fx: true,
            time_control: true,
            time_amount_index: 3,
            press_confirm: false,
        }
    }
}

impl OptionState {
    /// Seconds per side; unknown indices give no time at all.
    pub fn time_amount_s(&self) -> f64 {
        TIME_AMOUNTS_S
            .get(usize::from(self.time_amount_index))
            .copied()
            .unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GameMode {
    #[default]
    NotStarted,
    HumanVsHuman,
    HumanVsAI,
    AIvsHuman,
    AIvsAI,
}

/// Who moves a side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Human,
    Computer,
}

impl GameMode {
    /// `(white, black)` player kinds, or `None` when no game runs.
    pub const fn players(self) -> Option<(PlayerKind, PlayerKind)> {
        use PlayerKind::{Computer, Human};
        match self {
            GameMode::NotStarted => None,
            GameMode::HumanVsHuman => Some((Human, Human)),
            GameMode::HumanVsAI => Some((Human, Computer)),
            GameMode::AIvsHuman => Some((Computer, Human)),
            GameMode::AIvsAI => Some((Computer, Computer)),
        }
    }

    pub const fn from_players(white: PlayerKind, black: PlayerKind) -> Self {
        use PlayerKind::{Computer, Human};
        match (white, black) {
            (Human, Human) => GameMode::HumanVsHuman,
            (Human, Computer) => GameMode::HumanVsAI,
            (Computer, Human) => GameMode::AIvsHuman,
            (Computer, Computer) => GameMode::AIvsAI,
        }
    }

    pub fn is_computer(self, color: Color) -> bool {
        match (self.players(), color) {
            (Some((white, _)), Color::White) => white == PlayerKind::Computer,
            (Some((_, black)), Color::Black) => black == PlayerKind::Computer,
            (None, _) => false,
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_lowercase().as_str() {
            "not-started" | "none" => Some(GameMode::NotStarted),
            "hvh" | "human-vs-human" => Some(GameMode::HumanVsHuman),
            "hva" | "human-vs-ai" => Some(GameMode::HumanVsAI),
            "avh" | "ai-vs-human" => Some(GameMode::AIvsHuman),
            "ava" | "ai-vs-ai" => Some(GameMode::AIvsAI),
            _ => None,
        }
    }
}

/// Board-wide state the owner replicates as one scalar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoardStateMessage {
    pub game_mode: GameMode,
    pub showing_options: bool,
    pub slide_board: bool,
    pub time_control: bool,
    pub time_amount_index: u8,
    pub board_rotation: f32,
    /// Bumped on every local new game or reset.
    pub game_epoch: u32,
}

impl BoardStateMessage {
    /// Fold the replicated fields into `options`, leaving local-only ones.
    pub fn merge_into(&self, options: OptionState) -> OptionState {
        OptionState {
            slide_board: self.slide_board,
            time_control: self.time_control,
            time_amount_index: self.time_amount_index,
            ..options
        }
    }
}
