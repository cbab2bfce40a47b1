//! Board coordinates for tic-tac-toe moves.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// A zero-based `(row, col)` coordinate on an N×N board.
///
/// Positions order by row first, then column, which is the scan order
/// every tie-break in the pipeline relies on. A position carries no board
/// size of its own; use [`Position::in_bounds`] before touching a board.
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
    JsonSchema,
    derive_new::new,
)]
pub struct Position {
    /// Zero-based row.
    pub row: usize,
    /// Zero-based column.
    pub col: usize,
}

impl Position {
    /// Returns true if the position lies on a board of the given size.
    pub fn in_bounds(self, size: usize) -> bool {
        self.row < size && self.col < size
    }

    /// Converts the position to a row-major index.
    pub fn to_index(self, size: usize) -> usize {
        self.row * size + self.col
    }

    /// Creates a position from a row-major index, if it lies on the board.
    #[instrument]
    pub fn from_index(index: usize, size: usize) -> Option<Self> {
        if size == 0 || index >= size * size {
            return None;
        }
        Some(Self::new(index / size, index % size))
    }

    /// The center cell, which only exists on odd-sized boards.
    pub fn center(size: usize) -> Option<Self> {
        if size % 2 == 1 {
            Some(Self::new(size / 2, size / 2))
        } else {
            None
        }
    }

    /// Parses `"row,col"`, `"row col"` or a 1-based cell number.
    #[instrument]
    pub fn parse(s: &str, size: usize) -> Option<Self> {
        let s = s.trim();
        let parts: Vec<&str> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();

        match parts.as_slice() {
            [single] => {
                let number = single.parse::<usize>().ok()?;
                if number == 0 {
                    return None;
                }
                Self::from_index(number - 1, size)
            }
            [row, col] => {
                let pos = Self::new(row.parse().ok()?, col.parse().ok()?);
                pos.in_bounds(size).then_some(pos)
            }
            _ => None,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_row_major() {
        let mut positions = vec![
            Position::new(2, 0),
            Position::new(0, 2),
            Position::new(1, 1),
            Position::new(0, 0),
        ];
        positions.sort();
        assert_eq!(
            positions,
            vec![
                Position::new(0, 0),
                Position::new(0, 2),
                Position::new(1, 1),
                Position::new(2, 0),
            ]
        );
    }

    #[test]
    fn test_index_conversion() {
        assert_eq!(Position::new(1, 1).to_index(3), 4);
        assert_eq!(Position::from_index(8, 3), Some(Position::new(2, 2)));
        assert_eq!(Position::from_index(9, 3), None);
    }

    #[test]
    fn test_center_only_on_odd_boards() {
        assert_eq!(Position::center(3), Some(Position::new(1, 1)));
        assert_eq!(Position::center(5), Some(Position::new(2, 2)));
        assert_eq!(Position::center(4), None);
    }

    #[test]
    fn test_parse_forms() {
        assert_eq!(Position::parse("1,2", 3), Some(Position::new(1, 2)));
        assert_eq!(Position::parse(" 0 0 ", 3), Some(Position::new(0, 0)));
        assert_eq!(Position::parse("5", 3), Some(Position::new(1, 1)));
        assert_eq!(Position::parse("0", 3), None);
        assert_eq!(Position::parse("3,0", 3), None);
        assert_eq!(Position::parse("center", 3), None);
    }
}
