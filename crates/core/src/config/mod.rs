use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{clock::PhaseTimings, Result, RotatorError};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub rotator: RotatorConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            words: ["fast", "reliable", "predictable"]
                .into_iter()
                .map(String::from)
                .collect(),
            rotator: RotatorConfig::default(),
        }
    }
}

impl AppConfig {
    /// Parses a JSON document, filling missing fields with defaults, and
    /// validates the timing section.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.rotator.validate()?;
        Ok(config)
    }

    /// Reads and parses a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Timing configuration for a single controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotatorConfig {
    #[serde(default = "default_cycle_duration_ms")]
    pub cycle_duration_ms: u64,
    #[serde(default)]
    pub split: PhaseSplit,
}

fn default_cycle_duration_ms() -> u64 {
    3_000
}

impl Default for RotatorConfig {
    fn default() -> Self {
        Self {
            cycle_duration_ms: default_cycle_duration_ms(),
            split: PhaseSplit::default(),
        }
    }
}

impl RotatorConfig {
    pub fn with_cycle_duration_ms(mut self, cycle_duration_ms: u64) -> Self {
        self.cycle_duration_ms = cycle_duration_ms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycle_duration_ms == 0 {
            return Err(RotatorError::InvalidTiming(
                "cycle duration must be greater than zero".to_string(),
            ));
        }
        self.split.validate()?;
        self.timings().map(|_| ())
    }

    /// Splits the cycle into its three windows. The entering window takes the
    /// rounding remainder so the windows always add up to the full cycle.
    pub fn timings(&self) -> Result<PhaseTimings> {
        self.split.validate()?;
        let total = self.cycle_duration_ms;
        let visible = share_of(total, self.split.visible_pct);
        let exiting = share_of(total, self.split.exiting_pct);
        let entering = total.saturating_sub(visible + exiting);

        PhaseTimings::new(
            Duration::from_millis(visible),
            Duration::from_millis(exiting),
            Duration::from_millis(entering),
        )
    }
}

/// `total * pct / 100`, rounded down, without overflowing.
fn share_of(total: u64, pct: u8) -> u64 {
    let pct = u64::from(pct);
    total / 100 * pct + total % 100 * pct / 100
}

/// Share of the cycle, in percent, given to each phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseSplit {
    pub visible_pct: u8,
    pub exiting_pct: u8,
    pub entering_pct: u8,
}

impl Default for PhaseSplit {
    fn default() -> Self {
        Self {
            visible_pct: 80,
            exiting_pct: 10,
            entering_pct: 10,
        }
    }
}

impl PhaseSplit {
    pub fn validate(&self) -> Result<()> {
        let shares = [self.visible_pct, self.exiting_pct, self.entering_pct];
        if shares.contains(&0) {
            return Err(RotatorError::InvalidTiming(format!(
                "every phase needs a non-zero share, got {shares:?}"
            )));
        }
        let sum: u32 = shares.iter().map(|share| u32::from(*share)).sum();
        if sum != 100 {
            return Err(RotatorError::InvalidTiming(format!(
                "phase shares must add up to 100, got {sum}"
            )));
        }
        Ok(())
    }
}
