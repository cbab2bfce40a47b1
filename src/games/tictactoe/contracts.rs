//! Post-move invariants for tic-tac-toe.
//!
//! The engine checks these after building a candidate state and before
//! handing it back, so a state that breaks them is never observed.

use super::action::MoveError;
use super::{Cell, GameState};
use tracing::{instrument, warn};

/// Invariant: turns alternate.
///
/// The first player's mark count equals the opponent's, or exceeds it
/// by exactly one.
pub struct TurnAlternation;

impl TurnAlternation {
    /// Returns true if the invariant holds.
    #[instrument(skip(state))]
    pub fn holds(state: &GameState) -> bool {
        let first = state.board().count(state.first_player());
        let second = state.board().count(state.first_player().opponent());

        let valid = first == second || first == second + 1;
        if !valid {
            warn!(first, second, "Turn alternation violated");
        }
        valid
    }
}

/// Invariant: move count matches the filled cells, and every recorded
/// move still shows its mark on the board.
///
/// States rebuilt with `GameState::from_board` carry only the moves made
/// after the rebuild, so history may be shorter than the filled count.
pub struct HistoryConsistent;

impl HistoryConsistent {
    /// Returns true if the invariant holds.
    #[instrument(skip(state))]
    pub fn holds(state: &GameState) -> bool {
        let filled = state
            .board()
            .cells()
            .iter()
            .filter(|c| **c != Cell::Empty)
            .count();
        let history_matches = state
            .history()
            .iter()
            .all(|mv| state.board().get(mv.position) == Some(Cell::Occupied(mv.mark)));

        let valid = filled == state.move_count() && history_matches;
        if !valid {
            warn!(
                filled,
                move_count = state.move_count(),
                history_matches,
                "History consistency violated"
            );
        }
        valid
    }
}

/// Verifies every post-move invariant.
#[instrument(skip(state))]
pub fn check_invariants(state: &GameState) -> Result<(), MoveError> {
    if !TurnAlternation::holds(state) {
        return Err(MoveError::InvariantViolation(
            "mark counts no longer alternate".to_string(),
        ));
    }
    if !HistoryConsistent::holds(state) {
        return Err(MoveError::InvariantViolation(
            "move history disagrees with the board".to_string(),
        ));
    }
    Ok(())
}
