//! Game engine: the only place a move turns into a new state.

use super::action::{Move, MoveError};
use super::contracts::check_invariants;
use super::rules::{check_winner, is_full};
use super::{Board, GameState, GameStatus, Mark, Position};
use tracing::{debug, info, instrument, warn};

/// Tic-tac-toe rules engine for one board geometry.
///
/// The engine holds no game state; it validates a move against a state
/// and returns the successor. A rejected move leaves the input untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameEngine {
    win_length: usize,
}

impl GameEngine {
    /// Creates an engine that needs `win_length` in a row to win.
    #[instrument]
    pub fn new(win_length: usize) -> Self {
        Self { win_length }
    }

    /// Length of a winning line.
    pub fn win_length(&self) -> usize {
        self.win_length
    }

    /// Applies `mark` at `position`, returning the successor state.
    ///
    /// Checks run in order: game over, bounds, occupancy, turn. The first
    /// failing check decides the error.
    #[instrument(skip(self, state), fields(move_count = state.move_count()))]
    pub fn apply_move(
        &self,
        state: &GameState,
        position: Position,
        mark: Mark,
    ) -> Result<GameState, MoveError> {
        if state.status().is_terminal() {
            warn!(status = ?state.status(), "Move attempted on finished game");
            return Err(MoveError::GameAlreadyOver);
        }
        let size = state.board().size();
        if !position.in_bounds(size) {
            warn!(%position, size, "Move out of bounds");
            return Err(MoveError::OutOfBounds(position, size));
        }
        if !state.board().is_empty(position) {
            warn!(%position, "Cell already occupied");
            return Err(MoveError::CellOccupied(position));
        }
        if mark != state.current_player() {
            warn!(%mark, expected = %state.current_player(), "Move out of turn");
            return Err(MoveError::WrongTurn(mark));
        }

        let mut next = state.clone();
        next.record_move(Move::new(mark, position))
            .map_err(|e| MoveError::InvariantViolation(e.to_string()))?;
        next.set_status(self.evaluate_status(next.board()));
        check_invariants(&next)?;

        info!(
            %mark,
            %position,
            status = ?next.status(),
            "Move applied"
        );
        Ok(next)
    }

    /// Evaluates a board: won, drawn, or still in progress.
    #[instrument(skip(self, board), fields(size = board.size()))]
    pub fn evaluate_status(&self, board: &Board) -> GameStatus {
        let status = if let Some(winner) = check_winner(board, self.win_length) {
            GameStatus::Won(winner)
        } else if is_full(board) {
            GameStatus::Draw
        } else {
            GameStatus::InProgress
        };
        debug!(?status, "Evaluated board");
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::tictactoe::Cell;

    fn play(engine: &GameEngine, moves: &[(usize, usize)]) -> GameState {
        let mut state = GameState::new(3, Mark::X);
        for &(row, col) in moves {
            let mark = state.current_player();
            state = engine
                .apply_move(&state, Position::new(row, col), mark)
                .unwrap();
        }
        state
    }

    #[test]
    fn test_apply_move_flips_turn() {
        let engine = GameEngine::new(3);
        let state = play(&engine, &[(1, 1)]);
        assert_eq!(state.current_player(), Mark::O);
        assert_eq!(state.move_count(), 1);
        assert_eq!(state.board().get(Position::new(1, 1)), Some(Cell::Occupied(Mark::X)));
        assert_eq!(state.history().len(), 1);
    }

    #[test]
    fn test_rejects_out_of_bounds() {
        let engine = GameEngine::new(3);
        let state = GameState::new(3, Mark::X);
        assert_eq!(
            engine.apply_move(&state, Position::new(3, 1), Mark::X),
            Err(MoveError::OutOfBounds(Position::new(3, 1), 3))
        );
    }

    #[test]
    fn test_rejects_occupied() {
        let engine = GameEngine::new(3);
        let state = play(&engine, &[(0, 0)]);
        assert_eq!(
            engine.apply_move(&state, Position::new(0, 0), Mark::O),
            Err(MoveError::CellOccupied(Position::new(0, 0)))
        );
    }

    #[test]
    fn test_rejects_wrong_turn() {
        let engine = GameEngine::new(3);
        let state = GameState::new(3, Mark::X);
        assert_eq!(
            engine.apply_move(&state, Position::new(0, 0), Mark::O),
            Err(MoveError::WrongTurn(Mark::O))
        );
    }

    #[test]
    fn test_detects_win_and_blocks_further_moves() {
        let engine = GameEngine::new(3);
        // X: top row, O: middle row (incomplete)
        let state = play(&engine, &[(0, 0), (1, 0), (0, 1), (1, 1), (0, 2)]);
        assert_eq!(state.status(), GameStatus::Won(Mark::X));
        assert_eq!(
            engine.apply_move(&state, Position::new(2, 2), Mark::O),
            Err(MoveError::GameAlreadyOver)
        );
    }

    #[test]
    fn test_detects_draw() {
        let engine = GameEngine::new(3);
        // X O X / X O O / O X X
        let state = play(
            &engine,
            &[(0, 0), (0, 1), (0, 2), (1, 1), (1, 0), (1, 2), (2, 1), (2, 0), (2, 2)],
        );
        assert_eq!(state.status(), GameStatus::Draw);
    }
}
