//! Session configuration loaded from TOML.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engines::engine_trait::EngineKind;
use crate::engines::opponent_driver::DriverMode;
use crate::errors::ConfigError;
use crate::session::options::OptionState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Rate of the replication tick that drives ownership and ledger pushes.
    pub tick_rate_hz: f64,
    /// Idle time before a claimed board is handed back.
    pub ownership_release_delay_s: f64,
    /// Pause between a computer move landing and its turn ending.
    pub ai_settle_delay_s: f64,
    /// Minimum time a computer search appears to take.
    pub ai_think_time_s: f64,
    pub engine: EngineKind,
    pub engine_seed: Option<u64>,
    pub driver_mode: DriverMode,
    /// Spare queens per color for promotions.
    pub reserve_queens: usize,
    pub default_options: OptionState,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30.0,
            ownership_release_delay_s: 0.0,
            ai_settle_delay_s: 0.5,
            ai_think_time_s: 0.25,
            engine: EngineKind::default(),
            engine_seed: None,
            driver_mode: DriverMode::default(),
            reserve_queens: 1,
            default_options: OptionState::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tick_rate_hz.is_finite() || self.tick_rate_hz <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "tick_rate_hz must be positive, got {}",
                self.tick_rate_hz
            )));
        }
        for (name, value) in [
            ("ownership_release_delay_s", self.ownership_release_delay_s),
            ("ai_settle_delay_s", self.ai_settle_delay_s),
            ("ai_think_time_s", self.ai_think_time_s),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Seconds between replication ticks.
    pub fn tick_delta_s(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }
}
