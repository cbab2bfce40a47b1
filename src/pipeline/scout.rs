//! Analysis stage: classifies the board into threats and opportunities.

use super::bounded::{BoundedFailure, run_until};
use super::capability::{
    AnalysisCapability, CapabilityError, LanguageModel, PromptContext,
};
use super::error::{PipelineError, PipelineErrorKind, PipelineResult};
use super::model::{BoardAnalysis, StageReport, elapsed_ms};
use super::prompt::{AnalysisReply, analysis_prompt, clamp_confidence, parse_reply, system_prompt};
use crate::games::tictactoe::{Board, Cell, GameState, Mark, winning_lines};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Rule-based analysis of `board` for `own_mark`.
///
/// A line with `win_length - 1` cells of one mark and a single empty cell
/// makes that empty cell an opportunity (own mark) or a threat (opponent).
/// A cell that finishes several lines is recorded once, with its count in
/// `lines_completed`.
#[instrument(skip(board), fields(size = board.size()))]
pub fn analyze_board(board: &Board, own_mark: Mark, win_length: usize) -> BoardAnalysis {
    let mut threats = BTreeSet::new();
    let mut opportunities = BTreeSet::new();
    let mut lines_completed: BTreeMap<_, usize> = BTreeMap::new();

    for line in winning_lines(board.size(), win_length) {
        let mut own = 0;
        let mut opponent = 0;
        let mut empty = Vec::new();
        for pos in &line {
            match board.get(*pos) {
                Some(Cell::Occupied(mark)) if mark == own_mark => own += 1,
                Some(Cell::Occupied(_)) => opponent += 1,
                _ => empty.push(*pos),
            }
        }

        if let [gap] = empty.as_slice() {
            if own == win_length - 1 {
                opportunities.insert(*gap);
                *lines_completed.entry(*gap).or_default() += 1;
            } else if opponent == win_length - 1 {
                threats.insert(*gap);
            }
        }
    }

    debug!(
        threats = threats.len(),
        opportunities = opportunities.len(),
        "Rule-based analysis complete"
    );

    BoardAnalysis {
        own_mark,
        board_size: board.size(),
        threats,
        opportunities,
        lines_completed,
        empty_cells: board.empty_positions(),
        confidence: 1.0,
    }
}

/// Deterministic analysis capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAnalysis;

#[async_trait::async_trait]
impl AnalysisCapability for RuleBasedAnalysis {
    fn name(&self) -> &str {
        "rules"
    }

    async fn analyze(
        &self,
        state: &GameState,
        own_mark: Mark,
        win_length: usize,
        _deadline: Instant,
    ) -> Result<BoardAnalysis, CapabilityError> {
        Ok(analyze_board(state.board(), own_mark, win_length))
    }
}

/// Analysis delegated to a language model.
#[derive(Debug, Clone)]
pub struct LlmAnalysis {
    model: Arc<dyn LanguageModel>,
}

impl LlmAnalysis {
    /// Wraps a language model.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait::async_trait]
impl AnalysisCapability for LlmAnalysis {
    fn name(&self) -> &str {
        "llm"
    }

    #[instrument(skip(self, state, deadline), fields(model = %self.model.model_name()))]
    async fn analyze(
        &self,
        state: &GameState,
        own_mark: Mark,
        win_length: usize,
        deadline: Instant,
    ) -> Result<BoardAnalysis, CapabilityError> {
        let prompt = PromptContext::new(
            system_prompt("scout"),
            analysis_prompt(state, own_mark, win_length),
            deadline,
        );
        let text = self.model.complete(&prompt).await?;
        let reply: AnalysisReply = parse_reply(&text)?;

        Ok(BoardAnalysis {
            own_mark,
            board_size: state.board().size(),
            threats: reply.threats.into_iter().collect(),
            opportunities: reply.opportunities.into_iter().collect(),
            lines_completed: BTreeMap::new(),
            empty_cells: state.board().empty_positions(),
            confidence: reply.confidence,
        })
    }
}

/// The scout: runs the configured analysis capability under a deadline.
#[derive(Clone)]
pub struct AnalysisStage {
    capability: Arc<dyn AnalysisCapability>,
    timeout: Duration,
    win_length: usize,
}

impl std::fmt::Debug for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisStage")
            .field("capability", &self.capability.name())
            .field("timeout", &self.timeout)
            .field("win_length", &self.win_length)
            .finish()
    }
}

impl AnalysisStage {
    /// Creates a stage over the given capability.
    pub fn new(capability: Arc<dyn AnalysisCapability>, timeout: Duration, win_length: usize) -> Self {
        Self {
            capability,
            timeout,
            win_length,
        }
    }

    /// Creates a stage that only uses the rule engine.
    pub fn rule_based(timeout: Duration, win_length: usize) -> Self {
        Self::new(Arc::new(RuleBasedAnalysis), timeout, win_length)
    }

    /// Name of the delegated capability.
    pub fn capability_name(&self) -> &str {
        self.capability.name()
    }

    /// Analyses `state` for the mark to move.
    ///
    /// Fails with `AnalysisTimeout` when the capability misses the deadline
    /// and `AnalysisError` when it fails or returns cells that are not
    /// empty cells of this board.
    #[instrument(skip(self, state), fields(capability = %self.capability.name()))]
    pub async fn analyze(&self, state: &GameState) -> PipelineResult<BoardAnalysis> {
        let own_mark = state.current_player();
        let deadline = Instant::now() + self.timeout;
        let capability = Arc::clone(&self.capability);
        let snapshot = state.clone();
        let win_length = self.win_length;

        let work = async move {
            capability
                .analyze(&snapshot, own_mark, win_length, deadline)
                .await
        };

        match run_until(work, deadline).await {
            Ok(analysis) => validate_analysis(analysis, state, own_mark),
            Err(BoundedFailure::Elapsed) => Err(PipelineError::new(
                PipelineErrorKind::AnalysisTimeout,
                format!("analysis exceeded {} ms", self.timeout.as_millis()),
            )
            .with_metadata("capability", self.capability.name())),
            Err(BoundedFailure::Failed(err)) => Err(PipelineError::new(
                PipelineErrorKind::AnalysisError,
                err.message,
            )
            .with_metadata("capability", self.capability.name())),
        }
    }

    /// Analyses `state`, substituting the rule-based analysis on failure.
    #[instrument(skip(self, state))]
    pub async fn analyze_or_fallback(&self, state: &GameState) -> StageReport<BoardAnalysis> {
        let start = StdInstant::now();
        match self.analyze(state).await {
            Ok(analysis) => {
                info!(confidence = analysis.confidence, "Analysis accepted");
                StageReport {
                    artifact: analysis,
                    fallback_used: false,
                    error: None,
                    elapsed_ms: elapsed_ms(start),
                }
            }
            Err(err) => {
                warn!(error = %err, "Analysis failed, substituting rule-based analysis");
                StageReport {
                    artifact: analyze_board(state.board(), state.current_player(), self.win_length),
                    fallback_used: true,
                    error: Some(err),
                    elapsed_ms: elapsed_ms(start),
                }
            }
        }
    }
}

/// Checks a delegated analysis against the real board.
///
/// Empty cells are always recomputed locally and confidence is clamped;
/// any threat or opportunity that is not an empty cell rejects the whole
/// analysis.
fn validate_analysis(
    mut analysis: BoardAnalysis,
    state: &GameState,
    own_mark: Mark,
) -> PipelineResult<BoardAnalysis> {
    let board = state.board();
    if let Some(bad) = analysis
        .threats
        .iter()
        .chain(analysis.opportunities.iter())
        .find(|p| !board.is_empty(**p))
    {
        return Err(PipelineError::new(
            PipelineErrorKind::AnalysisError,
            format!("analysis names {} which is not an empty cell", bad),
        ));
    }

    analysis.own_mark = own_mark;
    analysis.board_size = board.size();
    analysis.empty_cells = board.empty_positions();
    analysis.confidence = clamp_confidence(analysis.confidence);
    Ok(analysis)
}
