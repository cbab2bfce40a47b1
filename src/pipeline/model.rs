//! Artifacts passed between pipeline stages.
//!
//! Everything here is scoped to a single pipeline run: an analysis feeds a
//! decision, the decision feeds an execution, and all three are dropped
//! once the outcome is assembled.

use super::error::{PipelineError, PipelineErrorKind};
use crate::games::tictactoe::{GameState, Mark, Move, Position};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Structured view of a board from one mark's perspective.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardAnalysis {
    /// The mark the analysis was made for.
    pub own_mark: Mark,
    /// Side length of the analysed board.
    pub board_size: usize,
    /// Cells where the opponent is one move from completing a line.
    pub threats: BTreeSet<Position>,
    /// Cells where `own_mark` is one move from completing a line.
    pub opportunities: BTreeSet<Position>,
    /// How many lines each opportunity would complete at once.
    ///
    /// Delegated analyses may leave this empty, in which case every
    /// opportunity counts as completing one line.
    #[serde(skip)]
    pub lines_completed: BTreeMap<Position, usize>,
    /// Empty cells in row-major order.
    pub empty_cells: Vec<Position>,
    /// Confidence in `[0, 1]`; 1.0 for the rule-based path.
    pub confidence: f64,
}

impl BoardAnalysis {
    /// Number of lines `pos` would complete, defaulting to one.
    pub fn line_value(&self, pos: Position) -> usize {
        self.lines_completed.get(&pos).copied().unwrap_or(1)
    }

    /// Whether `pos` is one of the empty cells.
    pub fn is_empty_cell(&self, pos: Position) -> bool {
        self.empty_cells.contains(&pos)
    }
}

/// The strategist's chosen cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, derive_new::new)]
pub struct MoveDecision {
    /// Cell to play.
    pub target: Position,
    /// Why this cell was chosen.
    pub reasoning: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

/// What the executor did with a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveExecution {
    /// The cell actually played.
    pub position: Position,
    /// State after the move.
    pub updated_state: GameState,
    /// True when the decided target was unusable and a substitute was played.
    pub fallback_used: bool,
    /// Wall time spent in the executor.
    pub execution_time_ms: f64,
}

/// Which part of the pipeline produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum Stage {
    /// The scout.
    Analysis,
    /// The strategist.
    Decision,
    /// The executor.
    Execution,
    /// The orchestrator itself (overall deadline).
    Pipeline,
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum PipelinePhase {
    /// Not started.
    Idle,
    /// Scout running.
    Analyzing,
    /// Strategist running.
    Deciding,
    /// Executor running.
    Executing,
    /// A move was applied.
    Completed,
    /// No move could be applied.
    Failed,
}

/// A stage failure that was absorbed by a fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiagnostic {
    /// Where it happened.
    pub stage: Stage,
    /// What happened.
    pub kind: PipelineErrorKind,
    /// Detail from the underlying error.
    pub message: String,
}

impl StageDiagnostic {
    /// Builds a diagnostic from an absorbed error.
    pub fn from_error(stage: Stage, err: &PipelineError) -> Self {
        Self {
            stage,
            kind: err.kind,
            message: err.message.clone(),
        }
    }
}

/// Wall time per stage, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StageDurations {
    /// Scout.
    pub analysis_ms: f64,
    /// Strategist.
    pub decision_ms: f64,
    /// Executor.
    pub execution_ms: f64,
    /// Whole run, including overhead between stages.
    pub total_ms: f64,
}

/// Artifact produced by a stage together with how it was obtained.
#[derive(Debug, Clone)]
pub struct StageReport<T> {
    /// The accepted artifact (delegated or substituted).
    pub artifact: T,
    /// True when the artifact came from the rule-based substitute.
    pub fallback_used: bool,
    /// The absorbed failure, if any.
    pub error: Option<PipelineError>,
    /// Wall time spent in the stage.
    pub elapsed_ms: f64,
}

/// Final result of one AI turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct PipelineOutcome {
    /// The move that was applied.
    pub(crate) chosen_move: Move,
    /// Game state after the move.
    pub(crate) updated_state: GameState,
    /// True if any stage fell back to its rule-based substitute.
    pub(crate) fallback_used: bool,
    /// Per-stage timings.
    pub(crate) durations: StageDurations,
    /// Human-readable explanation of the move.
    pub(crate) reasoning: String,
    /// Failures absorbed along the way.
    pub(crate) diagnostics: Vec<StageDiagnostic>,
    /// Confidence of the accepted analysis, if the scout finished.
    pub(crate) analysis_confidence: Option<f64>,
    /// Confidence of the accepted decision, if the strategist finished.
    pub(crate) decision_confidence: Option<f64>,
    /// Phases the run passed through.
    pub(crate) phases: Vec<PipelinePhase>,
}

impl PipelineOutcome {
    /// Consumes the outcome, keeping only the new state.
    pub fn into_state(self) -> GameState {
        self.updated_state
    }
}

/// Milliseconds elapsed since `start`.
pub(crate) fn elapsed_ms(start: std::time::Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
