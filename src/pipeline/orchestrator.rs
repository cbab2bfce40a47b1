//! Sequences scout, strategist and executor into one AI turn.

use super::capability::{AnalysisCapability, DecisionCapability};
use super::config::PipelineConfig;
use super::error::{PipelineError, PipelineErrorKind, PipelineResult};
use super::executor::ExecutionStage;
use super::model::{
    MoveExecution, PipelineOutcome, PipelinePhase, Stage, StageDiagnostic, StageDurations,
    elapsed_ms,
};
use super::scout::AnalysisStage;
use super::strategist::DecisionStage;
use crate::games::tictactoe::{GameEngine, GameState, Move};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

/// What a run has accumulated so far.
///
/// Lives outside the deadline-bounded future so that the progress made
/// before an overall timeout is still reported.
#[derive(Debug, Default)]
struct RunTrace {
    phases: Vec<PipelinePhase>,
    durations: StageDurations,
    diagnostics: Vec<StageDiagnostic>,
    fallback_used: bool,
    analysis_confidence: Option<f64>,
    decision_confidence: Option<f64>,
    reasoning: String,
}

impl RunTrace {
    fn enter(&mut self, phase: PipelinePhase) {
        debug!(%phase, "Pipeline phase");
        self.phases.push(phase);
    }

    /// Marks the run failed and records the phase trail on `err`.
    fn fail(&mut self, err: PipelineError) -> PipelineError {
        self.enter(PipelinePhase::Failed);
        err.with_metadata("phases", format!("{:?}", self.phases))
    }

    fn absorb(&mut self, stage: Stage, err: Option<&PipelineError>, fallback_used: bool) {
        self.fallback_used |= fallback_used;
        if let Some(err) = err {
            self.diagnostics.push(StageDiagnostic::from_error(stage, err));
        }
    }
}

/// Runs the three-stage decision pipeline.
///
/// Each stage has its own budget and the whole run has an overall one.
/// Capability failures and timeouts are replaced by rule-based results;
/// the run only fails when the game is over or no empty cell exists.
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    scout: AnalysisStage,
    strategist: DecisionStage,
    executor: ExecutionStage,
    overall_timeout: Duration,
    board_size: usize,
}

impl PipelineOrchestrator {
    /// Builds an orchestrator from a configuration and two capabilities.
    ///
    /// The configuration is used as given; callers loading it from outside
    /// run [`PipelineConfig::validate`] first.
    #[instrument(skip(analysis, decision))]
    pub fn new(
        config: &PipelineConfig,
        analysis: Arc<dyn AnalysisCapability>,
        decision: Arc<dyn DecisionCapability>,
    ) -> Self {
        let win_length = config.effective_win_length();
        let orchestrator = Self {
            scout: AnalysisStage::new(analysis, config.analysis_timeout(), win_length),
            strategist: DecisionStage::new(decision, config.decision_timeout()),
            executor: ExecutionStage::new(GameEngine::new(win_length), config.execution_timeout()),
            overall_timeout: config.overall_timeout(),
            board_size: *config.board_size(),
        };
        info!(
            analysis = orchestrator.scout.capability_name(),
            decision = orchestrator.strategist.capability_name(),
            board_size = orchestrator.board_size,
            win_length,
            "Creating pipeline orchestrator"
        );
        orchestrator
    }

    /// Builds an orchestrator that uses only the rule engine.
    pub fn rule_based(config: &PipelineConfig) -> Self {
        Self::new(
            config,
            Arc::new(super::scout::RuleBasedAnalysis),
            Arc::new(super::strategist::RuleBasedStrategy),
        )
    }

    /// Engine the executor applies moves with.
    pub fn engine(&self) -> GameEngine {
        self.executor.engine()
    }

    /// Side length of the boards this orchestrator was configured for.
    pub fn board_size(&self) -> usize {
        self.board_size
    }

    /// Plays one move for the mark to move in `state`.
    ///
    /// `state` itself is never modified; the new state is in the outcome.
    /// Dropping the returned future mid-run leaves nothing half-applied.
    /// A returned error carries the phase trail under the `phases` metadata key.
    #[instrument(skip(self, state), fields(mark = %state.current_player(), move_count = state.move_count()))]
    pub async fn run(&self, state: &GameState) -> PipelineResult<PipelineOutcome> {
        let start = Instant::now();
        let mut trace = RunTrace::default();
        trace.enter(PipelinePhase::Idle);

        if state.status().is_terminal() {
            warn!(status = ?state.status(), "AI turn requested on a finished game");
            return Err(trace.fail(PipelineError::new(
                PipelineErrorKind::GameAlreadyOver,
                format!("game already finished: {:?}", state.status()),
            )));
        }

        let staged = tokio::time::timeout(self.overall_timeout, self.run_stages(state, &mut trace)).await;

        let execution = match staged {
            Ok(Ok(execution)) => execution,
            Ok(Err(err)) => {
                let err = trace.fail(err);
                error!(error = %err, phases = ?trace.phases, "Pipeline failed");
                return Err(err);
            }
            Err(_) => {
                let err = PipelineError::new(
                    PipelineErrorKind::PipelineTimeout,
                    format!("pipeline exceeded {} ms", self.overall_timeout.as_millis()),
                );
                warn!(error = %err, phases = ?trace.phases, "Overall deadline hit, playing fallback move");
                trace.absorb(Stage::Pipeline, Some(&err), true);
                trace.enter(PipelinePhase::Executing);

                let execution = match self.executor.execute_fallback(state) {
                    Ok(execution) => execution,
                    Err(err) => {
                        let err = trace.fail(err);
                        error!(error = %err, "Fallback move failed");
                        return Err(err);
                    }
                };
                trace.durations.execution_ms = execution.execution_time_ms;
                trace.reasoning = format!(
                    "Pipeline deadline exceeded; played first open cell at {}",
                    execution.position
                );
                execution
            }
        };

        trace.enter(PipelinePhase::Completed);
        trace.durations.total_ms = elapsed_ms(start);
        Ok(self.assemble(state, execution, trace))
    }

    async fn run_stages(
        &self,
        state: &GameState,
        trace: &mut RunTrace,
    ) -> PipelineResult<MoveExecution> {
        trace.enter(PipelinePhase::Analyzing);
        let analysis = self.scout.analyze_or_fallback(state).await;
        trace.durations.analysis_ms = analysis.elapsed_ms;
        trace.analysis_confidence = Some(analysis.artifact.confidence);
        trace.absorb(Stage::Analysis, analysis.error.as_ref(), analysis.fallback_used);

        trace.enter(PipelinePhase::Deciding);
        let decision = self
            .strategist
            .decide_or_fallback(&analysis.artifact, state)
            .await?;
        trace.durations.decision_ms = decision.elapsed_ms;
        trace.decision_confidence = Some(decision.artifact.confidence);
        trace.absorb(Stage::Decision, decision.error.as_ref(), decision.fallback_used);

        trace.enter(PipelinePhase::Executing);
        let execution = self.executor.execute(state, &decision.artifact)?;
        trace.durations.execution_ms = execution.execution_time_ms;
        trace.fallback_used |= execution.fallback_used;

        if execution.execution_time_ms > self.executor.timeout().as_secs_f64() * 1000.0 {
            let err = PipelineError::new(
                PipelineErrorKind::ExecutionTimeout,
                format!(
                    "execution took {:.1} ms, bound is {} ms",
                    execution.execution_time_ms,
                    self.executor.timeout().as_millis()
                ),
            );
            trace.absorb(Stage::Execution, Some(&err), false);
        }

        trace.reasoning = if execution.fallback_used {
            format!(
                "{}; target {} was unplayable, played {} instead",
                decision.artifact.reasoning, decision.artifact.target, execution.position
            )
        } else {
            decision.artifact.reasoning.clone()
        };

        Ok(execution)
    }

    fn assemble(
        &self,
        state: &GameState,
        execution: MoveExecution,
        trace: RunTrace,
    ) -> PipelineOutcome {
        let chosen_move = Move::new(state.current_player(), execution.position);

        info!(
            %chosen_move,
            fallback_used = trace.fallback_used,
            total_ms = trace.durations.total_ms,
            diagnostics = trace.diagnostics.len(),
            "Pipeline completed"
        );

        PipelineOutcome {
            chosen_move,
            updated_state: execution.updated_state,
            fallback_used: trace.fallback_used,
            durations: trace.durations,
            reasoning: trace.reasoning,
            diagnostics: trace.diagnostics,
            analysis_confidence: trace.analysis_confidence,
            decision_confidence: trace.decision_confidence,
            phases: trace.phases,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::{Mark, Position};

    #[tokio::test]
    async fn test_rule_based_turn_takes_center() {
        let orchestrator = PipelineOrchestrator::rule_based(&PipelineConfig::new());
        let state = GameState::new(3, Mark::O);
        let outcome = orchestrator.run(&state).await.unwrap();
        assert_eq!(outcome.chosen_move().position, Position::new(1, 1));
        assert_eq!(outcome.chosen_move().mark, Mark::O);
        assert!(!outcome.fallback_used());
        assert_eq!(
            outcome.phases(),
            &vec![
                PipelinePhase::Idle,
                PipelinePhase::Analyzing,
                PipelinePhase::Deciding,
                PipelinePhase::Executing,
                PipelinePhase::Completed,
            ]
        );
        assert_eq!(state.move_count(), 0);
        assert_eq!(outcome.updated_state().move_count(), 1);
    }

    #[tokio::test]
    async fn test_finished_game_error_carries_phases() {
        use crate::games::tictactoe::{Board, GameStatus};

        let orchestrator = PipelineOrchestrator::rule_based(&PipelineConfig::new());
        let state = GameState::from_board(Board::new(3), Mark::X, GameStatus::Won(Mark::O));
        let err = orchestrator.run(&state).await.unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::GameAlreadyOver);
        assert_eq!(
            err.metadata.get("phases").map(String::as_str),
            Some("[Idle, Failed]")
        );
    }

    #[test]
    fn test_exposes_configured_geometry() {
        let config = PipelineConfig::new().with_board_size(5).with_win_length(4);
        let orchestrator = PipelineOrchestrator::rule_based(&config);
        assert_eq!(orchestrator.board_size(), 5);
        assert_eq!(orchestrator.engine().win_length(), 4);
    }
}
