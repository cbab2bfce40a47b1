//! Decision stage: picks one target cell from a board analysis.

use super::bounded::{BoundedFailure, run_until};
use super::capability::{CapabilityError, DecisionCapability, LanguageModel, PromptContext};
use super::error::{PipelineError, PipelineErrorKind, PipelineResult};
use super::model::{BoardAnalysis, MoveDecision, StageReport, elapsed_ms};
use super::prompt::{DecisionReply, clamp_confidence, decision_prompt, parse_reply, system_prompt};
use crate::games::tictactoe::{GameState, Position};
use std::cmp::Reverse;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Deterministic move choice.
///
/// Priority:
/// 1. the opportunity completing the most lines (lowest row, then col on ties);
/// 2. the lowest threat, to block it;
/// 3. the center, if the board has one and it is empty;
/// 4. the lowest empty cell.
///
/// Fails with `NoLegalMoves` only when the analysis lists no empty cells.
#[instrument(skip(analysis), fields(own_mark = %analysis.own_mark))]
pub fn decide_by_rules(analysis: &BoardAnalysis) -> PipelineResult<MoveDecision> {
    let confidence = analysis.confidence;

    if let Some(target) = analysis
        .opportunities
        .iter()
        .copied()
        .max_by_key(|p| (analysis.line_value(*p), Reverse(*p)))
    {
        debug!(cell = %target, "Completing a line");
        return Ok(MoveDecision::new(
            target,
            format!("Completes a winning line at {}", target),
            confidence,
        ));
    }

    if let Some(target) = analysis.threats.iter().next().copied() {
        debug!(cell = %target, "Blocking a threat");
        return Ok(MoveDecision::new(
            target,
            format!("Blocks the opponent's line at {}", target),
            confidence,
        ));
    }

    if let Some(center) = Position::center(analysis.board_size)
        && analysis.is_empty_cell(center)
    {
        debug!(%center, "Taking the center");
        return Ok(MoveDecision::new(
            center,
            "Takes the open center".to_string(),
            confidence,
        ));
    }

    match analysis.empty_cells.iter().min().copied() {
        Some(target) => {
            debug!(cell = %target, "Taking the first empty cell");
            Ok(MoveDecision::new(
                target,
                format!("Takes the first open cell at {}", target),
                confidence,
            ))
        }
        None => Err(PipelineError::new(
            PipelineErrorKind::NoLegalMoves,
            "analysis lists no empty cells",
        )),
    }
}

/// Deterministic decision capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedStrategy;

#[async_trait::async_trait]
impl DecisionCapability for RuleBasedStrategy {
    fn name(&self) -> &str {
        "rules"
    }

    async fn decide(
        &self,
        analysis: &BoardAnalysis,
        _state: &GameState,
        _deadline: Instant,
    ) -> Result<MoveDecision, CapabilityError> {
        decide_by_rules(analysis).map_err(|e| CapabilityError::new(e.message))
    }
}

/// Decision delegated to a language model.
#[derive(Debug, Clone)]
pub struct LlmStrategy {
    model: Arc<dyn LanguageModel>,
}

impl LlmStrategy {
    /// Wraps a language model.
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait::async_trait]
impl DecisionCapability for LlmStrategy {
    fn name(&self) -> &str {
        "llm"
    }

    #[instrument(skip(self, analysis, state, deadline), fields(model = %self.model.model_name()))]
    async fn decide(
        &self,
        analysis: &BoardAnalysis,
        state: &GameState,
        deadline: Instant,
    ) -> Result<MoveDecision, CapabilityError> {
        let prompt = PromptContext::new(
            system_prompt("strategist"),
            decision_prompt(analysis, state),
            deadline,
        );
        let text = self.model.complete(&prompt).await?;
        let reply: DecisionReply = parse_reply(&text)?;

        Ok(MoveDecision::new(
            Position::new(reply.row, reply.col),
            reply.reasoning,
            clamp_confidence(reply.confidence),
        ))
    }
}

/// The strategist: runs the configured decision capability under a deadline.
#[derive(Clone)]
pub struct DecisionStage {
    capability: Arc<dyn DecisionCapability>,
    timeout: Duration,
}

impl std::fmt::Debug for DecisionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecisionStage")
            .field("capability", &self.capability.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl DecisionStage {
    /// Creates a stage over the given capability.
    pub fn new(capability: Arc<dyn DecisionCapability>, timeout: Duration) -> Self {
        Self {
            capability,
            timeout,
        }
    }

    /// Creates a stage that only uses the rule engine.
    pub fn rule_based(timeout: Duration) -> Self {
        Self::new(Arc::new(RuleBasedStrategy), timeout)
    }

    /// Name of the delegated capability.
    pub fn capability_name(&self) -> &str {
        self.capability.name()
    }

    /// Asks the capability for a target.
    ///
    /// Fails with `DecisionTimeout` on a missed deadline and
    /// `DecisionError` when the capability fails or names a cell that is
    /// not in `analysis.empty_cells`.
    #[instrument(skip(self, analysis, state), fields(capability = %self.capability.name()))]
    pub async fn decide(
        &self,
        analysis: &BoardAnalysis,
        state: &GameState,
    ) -> PipelineResult<MoveDecision> {
        let deadline = Instant::now() + self.timeout;
        let capability = Arc::clone(&self.capability);
        let analysis_snapshot = analysis.clone();
        let state_snapshot = state.clone();

        let work = async move {
            capability
                .decide(&analysis_snapshot, &state_snapshot, deadline)
                .await
        };

        match run_until(work, deadline).await {
            Ok(decision) if analysis.is_empty_cell(decision.target) => Ok(decision),
            Ok(decision) => Err(PipelineError::new(
                PipelineErrorKind::DecisionError,
                format!("{} is not an empty cell", decision.target),
            )
            .with_metadata("capability", self.capability.name())),
            Err(BoundedFailure::Elapsed) => Err(PipelineError::new(
                PipelineErrorKind::DecisionTimeout,
                format!("decision exceeded {} ms", self.timeout.as_millis()),
            )
            .with_metadata("capability", self.capability.name())),
            Err(BoundedFailure::Failed(err)) => Err(PipelineError::new(
                PipelineErrorKind::DecisionError,
                err.message,
            )
            .with_metadata("capability", self.capability.name())),
        }
    }

    /// Decides, substituting the rule-based decision on any failure.
    ///
    /// Fails only if the rule engine itself has nothing to choose from.
    #[instrument(skip(self, analysis, state))]
    pub async fn decide_or_fallback(
        &self,
        analysis: &BoardAnalysis,
        state: &GameState,
    ) -> PipelineResult<StageReport<MoveDecision>> {
        let start = StdInstant::now();
        match self.decide(analysis, state).await {
            Ok(decision) => {
                info!(cell = %decision.target, confidence = decision.confidence, "Decision accepted");
                Ok(StageReport {
                    artifact: decision,
                    fallback_used: false,
                    error: None,
                    elapsed_ms: elapsed_ms(start),
                })
            }
            Err(err) => {
                warn!(error = %err, "Decision failed, substituting rule-based decision");
                let decision = decide_by_rules(analysis)?;
                Ok(StageReport {
                    artifact: decision,
                    fallback_used: true,
                    error: Some(err),
                    elapsed_ms: elapsed_ms(start),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::Mark;
    use std::collections::{BTreeMap, BTreeSet};

    fn analysis(
        threats: &[(usize, usize)],
        opportunities: &[(usize, usize)],
        empty: &[(usize, usize)],
    ) -> BoardAnalysis {
        let to_pos = |cells: &[(usize, usize)]| -> Vec<Position> {
            cells.iter().map(|&(r, c)| Position::new(r, c)).collect()
        };
        BoardAnalysis {
            own_mark: Mark::O,
            board_size: 3,
            threats: to_pos(threats).into_iter().collect::<BTreeSet<_>>(),
            opportunities: to_pos(opportunities).into_iter().collect::<BTreeSet<_>>(),
            lines_completed: BTreeMap::new(),
            empty_cells: to_pos(empty),
            confidence: 1.0,
        }
    }

    #[test]
    fn test_opportunity_beats_threat() {
        let a = analysis(&[(0, 2)], &[(2, 0)], &[(0, 2), (2, 0), (2, 2)]);
        assert_eq!(decide_by_rules(&a).unwrap().target, Position::new(2, 0));
    }

    #[test]
    fn test_lowest_threat_blocked() {
        let a = analysis(&[(2, 1), (0, 2)], &[], &[(0, 2), (2, 1), (2, 2)]);
        assert_eq!(decide_by_rules(&a).unwrap().target, Position::new(0, 2));
    }

    #[test]
    fn test_more_valuable_opportunity_wins_over_lower_cell() {
        let mut a = analysis(&[], &[(0, 2), (2, 2)], &[(0, 2), (2, 2)]);
        a.lines_completed.insert(Position::new(0, 2), 1);
        a.lines_completed.insert(Position::new(2, 2), 2);
        assert_eq!(decide_by_rules(&a).unwrap().target, Position::new(2, 2));
    }

    #[test]
    fn test_center_then_first_empty() {
        let a = analysis(&[], &[], &[(0, 0), (1, 1)]);
        assert_eq!(decide_by_rules(&a).unwrap().target, Position::new(1, 1));

        let a = analysis(&[], &[], &[(2, 2), (0, 1)]);
        assert_eq!(decide_by_rules(&a).unwrap().target, Position::new(0, 1));
    }

    #[test]
    fn test_no_empty_cells() {
        let a = analysis(&[], &[], &[]);
        assert_eq!(
            decide_by_rules(&a).unwrap_err().kind(),
            PipelineErrorKind::NoLegalMoves
        );
    }

    #[test]
    fn test_repeatable() {
        let a = analysis(&[(1, 0)], &[], &[(1, 0), (2, 2)]);
        let first = decide_by_rules(&a).unwrap();
        for _ in 0..10 {
            assert_eq!(decide_by_rules(&a).unwrap(), first);
        }
    }
}
