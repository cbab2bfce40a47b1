//! Timeouts and board geometry for the decision pipeline.

use crate::agent_config::ConfigError;
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument};

/// Smallest supported board.
pub const MIN_BOARD_SIZE: usize = 3;
/// Largest supported board.
pub const MAX_BOARD_SIZE: usize = 9;

/// Orchestrator configuration.
///
/// Every timeout is independently settable. `win_length` defaults to the
/// board size, i.e. a full row, column or diagonal.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
#[serde(default)]
pub struct PipelineConfig {
    /// Budget for the scout, in milliseconds.
    analysis_timeout_ms: u64,
    /// Budget for the strategist, in milliseconds.
    decision_timeout_ms: u64,
    /// Safety bound for the executor, in milliseconds.
    execution_timeout_ms: u64,
    /// Budget for the whole run, in milliseconds.
    overall_timeout_ms: u64,
    /// Side length N of the N×N board.
    board_size: usize,
    /// Marks in a row needed to win; `None` means `board_size`.
    #[setters(strip_option)]
    win_length: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            analysis_timeout_ms: 3_000,
            decision_timeout_ms: 3_000,
            execution_timeout_ms: 500,
            overall_timeout_ms: 8_000,
            board_size: 3,
            win_length: None,
        }
    }
}

impl PipelineConfig {
    /// Creates a configuration with default values.
    #[instrument]
    pub fn new() -> Self {
        Self::default()
    }

    /// Effective winning line length.
    pub fn effective_win_length(&self) -> usize {
        self.win_length.unwrap_or(self.board_size)
    }

    /// Scout budget.
    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_millis(self.analysis_timeout_ms)
    }

    /// Strategist budget.
    pub fn decision_timeout(&self) -> Duration {
        Duration::from_millis(self.decision_timeout_ms)
    }

    /// Executor bound.
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_millis(self.execution_timeout_ms)
    }

    /// Whole-run budget.
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }

    /// Checks geometry and timeouts.
    #[instrument(skip(self))]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_BOARD_SIZE..=MAX_BOARD_SIZE).contains(&self.board_size) {
            return Err(ConfigError::new(format!(
                "board_size must be between {} and {}, got {}",
                MIN_BOARD_SIZE, MAX_BOARD_SIZE, self.board_size
            )));
        }

        let win_length = self.effective_win_length();
        if !(MIN_BOARD_SIZE..=self.board_size).contains(&win_length) {
            return Err(ConfigError::new(format!(
                "win_length must be between {} and {}, got {}",
                MIN_BOARD_SIZE, self.board_size, win_length
            )));
        }

        for (name, value) in [
            ("analysis_timeout_ms", self.analysis_timeout_ms),
            ("decision_timeout_ms", self.decision_timeout_ms),
            ("execution_timeout_ms", self.execution_timeout_ms),
            ("overall_timeout_ms", self.overall_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::new(format!("{} must be positive", name)));
            }
        }

        debug!(board_size = self.board_size, win_length, "Pipeline config valid");
        Ok(())
    }
}
