//! Win detection logic for tic-tac-toe.

use super::super::{Board, Cell, Mark, Position};
use tracing::instrument;

/// Enumerates every winning line on an N×N board.
///
/// A line is any run of `win_length` consecutive cells along a row, a
/// column, a diagonal or an anti-diagonal. Lines are produced in a fixed
/// order (rows, columns, diagonals, anti-diagonals), each scanned in
/// row-major order. With `win_length == size` this is the classic
/// rows/columns/two-diagonals set.
#[instrument]
pub fn winning_lines(size: usize, win_length: usize) -> Vec<Vec<Position>> {
    if win_length == 0 || win_length > size {
        return Vec::new();
    }

    let span = size - win_length + 1;
    let mut lines = Vec::new();

    // Rows
    for row in 0..size {
        for start in 0..span {
            lines.push(
                (0..win_length)
                    .map(|k| Position::new(row, start + k))
                    .collect(),
            );
        }
    }
    // Columns
    for col in 0..size {
        for start in 0..span {
            lines.push(
                (0..win_length)
                    .map(|k| Position::new(start + k, col))
                    .collect(),
            );
        }
    }
    // Diagonals
    for row in 0..span {
        for col in 0..span {
            lines.push(
                (0..win_length)
                    .map(|k| Position::new(row + k, col + k))
                    .collect(),
            );
        }
    }
    // Anti-diagonals
    for row in 0..span {
        for col in (win_length - 1)..size {
            lines.push(
                (0..win_length)
                    .map(|k| Position::new(row + k, col - k))
                    .collect(),
            );
        }
    }

    lines
}

/// Checks if there is a winner on the board.
///
/// Returns `Some(mark)` if some line is fully occupied by `mark`,
/// `None` otherwise.
#[instrument(skip(board), fields(size = board.size()))]
pub fn check_winner(board: &Board, win_length: usize) -> Option<Mark> {
    winning_lines(board.size(), win_length)
        .iter()
        .find_map(|line| line_owner(board, line))
}

fn line_owner(board: &Board, line: &[Position]) -> Option<Mark> {
    let first = board.get(*line.first()?)?.mark()?;
    line.iter()
        .all(|p| board.get(*p) == Some(Cell::Occupied(first)))
        .then_some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(board: &mut Board, cells: &[(usize, usize)], mark: Mark) {
        for &(row, col) in cells {
            board
                .set(Position::new(row, col), Cell::Occupied(mark))
                .unwrap();
        }
    }

    #[test]
    fn test_classic_line_count() {
        assert_eq!(winning_lines(3, 3).len(), 8);
    }

    #[test]
    fn test_windowed_line_count() {
        // 4x4 with three-in-a-row: 8 rows, 8 columns, 4 + 4 diagonals.
        assert_eq!(winning_lines(4, 3).len(), 24);
    }

    #[test]
    fn test_no_winner_empty_board() {
        let board = Board::new(3);
        assert_eq!(check_winner(&board, 3), None);
    }

    #[test]
    fn test_winner_top_row() {
        let mut board = Board::new(3);
        place(&mut board, &[(0, 0), (0, 1), (0, 2)], Mark::X);
        assert_eq!(check_winner(&board, 3), Some(Mark::X));
    }

    #[test]
    fn test_winner_anti_diagonal() {
        let mut board = Board::new(3);
        place(&mut board, &[(0, 2), (1, 1), (2, 0)], Mark::O);
        assert_eq!(check_winner(&board, 3), Some(Mark::O));
    }

    #[test]
    fn test_no_winner_incomplete() {
        let mut board = Board::new(3);
        place(&mut board, &[(0, 0), (0, 1)], Mark::X);
        assert_eq!(check_winner(&board, 3), None);
    }

    #[test]
    fn test_short_line_on_larger_board() {
        let mut board = Board::new(5);
        place(&mut board, &[(1, 3), (2, 2), (3, 1)], Mark::X);
        assert_eq!(check_winner(&board, 3), Some(Mark::X));
        assert_eq!(check_winner(&board, 5), None);
    }
}
