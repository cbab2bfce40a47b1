//! Execution stage: the only stage that changes game state.

use super::error::{PipelineError, PipelineErrorKind, PipelineResult};
use super::model::{MoveDecision, MoveExecution, elapsed_ms};
use crate::games::tictactoe::{GameEngine, GameState, MoveError, Position};
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// The executor: validates a decision and applies it through the engine.
///
/// Purely mechanical. A stale or invalid target is replaced by the lowest
/// empty cell of the state actually passed in.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionStage {
    engine: GameEngine,
    timeout: Duration,
}

impl ExecutionStage {
    /// Creates an executor over `engine` with a safety bound.
    pub fn new(engine: GameEngine, timeout: Duration) -> Self {
        Self { engine, timeout }
    }

    /// Engine moves are applied with.
    pub fn engine(&self) -> GameEngine {
        self.engine
    }

    /// The safety bound this stage is expected to stay under.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Applies `decision` to `state`.
    ///
    /// Fails with `GameAlreadyOver` on a finished game and `NoLegalMoves`
    /// when there is no empty cell to fall back to.
    #[instrument(skip(self, state, decision), fields(cell = %decision.target))]
    pub fn execute(&self, state: &GameState, decision: &MoveDecision) -> PipelineResult<MoveExecution> {
        let start = Instant::now();
        if state.status().is_terminal() {
            return Err(PipelineError::new(
                PipelineErrorKind::GameAlreadyOver,
                format!("game already finished: {:?}", state.status()),
            ));
        }

        let mark = state.current_player();
        match self.engine.apply_move(state, decision.target, mark) {
            Ok(next) => {
                info!(%mark, cell = %decision.target, "Executed decided move");
                Ok(self.finish(decision.target, next, false, start))
            }
            Err(MoveError::GameAlreadyOver) => Err(MoveError::GameAlreadyOver.into()),
            Err(err) => {
                warn!(error = %err, "Decided move rejected, using first empty cell");
                self.apply_first_empty(state, start)
            }
        }
    }

    /// Plays the lowest empty cell without consulting any decision.
    ///
    /// Used when the pipeline runs out of time before a decision exists.
    #[instrument(skip(self, state))]
    pub fn execute_fallback(&self, state: &GameState) -> PipelineResult<MoveExecution> {
        let start = Instant::now();
        if state.status().is_terminal() {
            return Err(MoveError::GameAlreadyOver.into());
        }
        self.apply_first_empty(state, start)
    }

    fn apply_first_empty(&self, state: &GameState, start: Instant) -> PipelineResult<MoveExecution> {
        let target = first_empty(state).ok_or_else(|| {
            PipelineError::new(PipelineErrorKind::NoLegalMoves, "no empty cell left")
        })?;
        let next = self.engine.apply_move(state, target, state.current_player())?;
        info!(cell = %target, "Executed fallback move");
        Ok(self.finish(target, next, true, start))
    }

    fn finish(
        &self,
        position: Position,
        next: GameState,
        fallback_used: bool,
        start: Instant,
    ) -> MoveExecution {
        let execution_time_ms = elapsed_ms(start);
        if execution_time_ms > self.timeout.as_secs_f64() * 1000.0 {
            warn!(execution_time_ms, bound_ms = self.timeout.as_millis() as u64, "Execution overran its bound");
        }
        MoveExecution {
            position,
            updated_state: next,
            fallback_used,
            execution_time_ms,
        }
    }
}

/// Lowest `(row, col)` empty cell of the state.
fn first_empty(state: &GameState) -> Option<Position> {
    state.board().empty_positions().into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::{Board, Cell, GameStatus, Mark};

    fn stage() -> ExecutionStage {
        ExecutionStage::new(GameEngine::new(3), Duration::from_millis(500))
    }

    fn decision(row: usize, col: usize) -> MoveDecision {
        MoveDecision::new(Position::new(row, col), "test".to_string(), 1.0)
    }

    #[test]
    fn test_executes_valid_target() {
        let state = GameState::new(3, Mark::X);
        let execution = stage().execute(&state, &decision(1, 1)).unwrap();
        assert!(!execution.fallback_used);
        assert_eq!(execution.position, Position::new(1, 1));
        let next = execution.updated_state;
        assert_eq!(next.board().get(Position::new(1, 1)), Some(Cell::Occupied(Mark::X)));
    }

    #[test]
    fn test_occupied_target_falls_back() {
        let engine = GameEngine::new(3);
        let state = GameState::new(3, Mark::X);
        let state = engine.apply_move(&state, Position::new(0, 0), Mark::X).unwrap();
        let execution = stage().execute(&state, &decision(0, 0)).unwrap();
        assert!(execution.fallback_used);
        assert_eq!(execution.position, Position::new(0, 1));
    }

    #[test]
    fn test_out_of_bounds_target_falls_back() {
        let state = GameState::new(3, Mark::X);
        let execution = stage().execute(&state, &decision(7, 7)).unwrap();
        assert!(execution.fallback_used);
        assert_eq!(execution.position, Position::new(0, 0));
    }

    #[test]
    fn test_full_board_has_no_legal_moves() {
        use Mark::{O, X};
        let rows = [[X, O, X], [X, O, O], [O, X, X]]
            .iter()
            .map(|row| row.iter().map(|m| Cell::Occupied(*m)).collect())
            .collect();
        let board = Board::from_rows(rows).unwrap();
        // Deliberately mislabelled as in progress.
        let state = GameState::from_board(board, X, GameStatus::InProgress);
        let err = stage().execute(&state, &decision(0, 0)).unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::NoLegalMoves);
    }

    #[test]
    fn test_finished_game_rejected() {
        let state = GameState::from_board(Board::new(3), Mark::X, GameStatus::Won(Mark::O));
        let err = stage().execute(&state, &decision(1, 1)).unwrap_err();
        assert_eq!(err.kind(), PipelineErrorKind::GameAlreadyOver);
    }
}
