//! Core domain types for tic-tac-toe.

use super::action::Move;
use super::position::Position;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A player's mark.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumIter,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum Mark {
    /// Mark X.
    X,
    /// Mark O.
    O,
}

impl Mark {
    /// Returns the opponent's mark.
    pub fn opponent(self) -> Self {
        match self {
            Mark::X => Mark::O,
            Mark::O => Mark::X,
        }
    }
}

/// A cell on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// Empty cell.
    Empty,
    /// Cell occupied by a mark.
    Occupied(Mark),
}

impl Cell {
    /// Returns the occupying mark, if any.
    pub fn mark(self) -> Option<Mark> {
        match self {
            Cell::Empty => None,
            Cell::Occupied(mark) => Some(mark),
        }
    }
}

/// Square N×N board, stored row-major.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Board {
    size: usize,
    cells: Vec<Cell>,
}

impl Board {
    /// Creates an empty board of the given size.
    #[instrument]
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![Cell::Empty; size * size],
        }
    }

    /// Builds a board from rows of cells.
    ///
    /// Returns `None` unless the rows form a non-empty square.
    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Option<Self> {
        let size = rows.len();
        if size == 0 || rows.iter().any(|row| row.len() != size) {
            return None;
        }
        Some(Self {
            size,
            cells: rows.into_iter().flatten().collect(),
        })
    }

    /// Side length of the board.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Gets the cell at the given position, or `None` when out of bounds.
    pub fn get(&self, pos: Position) -> Option<Cell> {
        if !pos.in_bounds(self.size) {
            return None;
        }
        self.cells.get(pos.to_index(self.size)).copied()
    }

    /// Sets the cell at the given position.
    pub fn set(&mut self, pos: Position, cell: Cell) -> Result<(), &'static str> {
        if !pos.in_bounds(self.size) {
            return Err("Position out of bounds");
        }
        let idx = pos.to_index(self.size);
        self.cells[idx] = cell;
        Ok(())
    }

    /// Checks if a cell is in bounds and empty.
    pub fn is_empty(&self, pos: Position) -> bool {
        matches!(self.get(pos), Some(Cell::Empty))
    }

    /// All cells in row-major order.
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Every position on the board in row-major order.
    pub fn positions(&self) -> impl Iterator<Item = Position> + '_ {
        (0..self.size * self.size).map(move |i| Position::new(i / self.size, i % self.size))
    }

    /// Empty positions in row-major order.
    pub fn empty_positions(&self) -> Vec<Position> {
        self.positions().filter(|p| self.is_empty(*p)).collect()
    }

    /// Number of cells holding the given mark.
    pub fn count(&self, mark: Mark) -> usize {
        self.cells
            .iter()
            .filter(|c| **c == Cell::Occupied(mark))
            .count()
    }

    /// Formats the board as a human-readable string.
    ///
    /// Empty cells show their 1-based row-major number.
    pub fn display(&self) -> String {
        let width = (self.size * self.size).to_string().len();
        let rule = vec!["-".repeat(width); self.size].join("+");
        let mut lines = Vec::with_capacity(self.size * 2);
        for row in 0..self.size {
            let line = (0..self.size)
                .map(|col| {
                    let pos = Position::new(row, col);
                    match self.get(pos) {
                        Some(Cell::Occupied(mark)) => format!("{:>width$}", mark.to_string()),
                        _ => format!("{:>width$}", pos.to_index(self.size) + 1),
                    }
                })
                .collect::<Vec<_>>()
                .join("|");
            lines.push(line);
            if row + 1 < self.size {
                lines.push(rule.clone());
            }
        }
        lines.join("\n")
    }
}

/// Current status of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    /// Game is ongoing.
    InProgress,
    /// Game ended in a win.
    Won(Mark),
    /// Game ended in a draw.
    Draw,
}

impl GameStatus {
    /// Returns true once the game has been won or drawn.
    pub fn is_terminal(self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }
}

/// Complete game state.
///
/// Treated as a value: the engine never mutates a state in place, it
/// returns a fresh copy with the move applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    board: Board,
    first_player: Mark,
    current_player: Mark,
    move_count: usize,
    status: GameStatus,
    history: Vec<Move>,
}

impl GameState {
    /// Creates a new game with an empty board.
    #[instrument]
    pub fn new(size: usize, first_player: Mark) -> Self {
        Self {
            board: Board::new(size),
            first_player,
            current_player: first_player,
            move_count: 0,
            status: GameStatus::InProgress,
            history: Vec::new(),
        }
    }

    /// Rebuilds a state from an arbitrary board.
    ///
    /// The player to move is derived from the mark counts; `status` is left
    /// for the caller to evaluate. Useful for analysing positions that were
    /// not reached through this engine. History starts empty.
    pub fn from_board(board: Board, first_player: Mark, status: GameStatus) -> Self {
        let first = board.count(first_player);
        let second = board.count(first_player.opponent());
        let current_player = if first > second {
            first_player.opponent()
        } else {
            first_player
        };
        Self {
            move_count: first + second,
            board,
            first_player,
            current_player,
            status,
            history: Vec::new(),
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// The mark that opened the game.
    pub fn first_player(&self) -> Mark {
        self.first_player
    }

    /// Returns the player to move.
    pub fn current_player(&self) -> Mark {
        self.current_player
    }

    /// Number of moves applied so far.
    pub fn move_count(&self) -> usize {
        self.move_count
    }

    /// Returns the game status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Returns the move history.
    pub fn history(&self) -> &[Move] {
        &self.history
    }

    /// Records a move (unchecked - use `GameEngine::apply_move` for validation).
    pub(super) fn record_move(&mut self, mv: Move) -> Result<(), &'static str> {
        self.board.set(mv.position, Cell::Occupied(mv.mark))?;
        self.history.push(mv);
        self.move_count += 1;
        self.current_player = mv.mark.opponent();
        Ok(())
    }

    /// Sets the game status.
    pub(super) fn set_status(&mut self, status: GameStatus) {
        self.status = status;
    }
}
