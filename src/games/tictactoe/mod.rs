mod action;
mod contracts;
mod engine;
mod position;
mod rules;
mod types;

pub use action::{Move, MoveError};
pub use contracts::{HistoryConsistent, TurnAlternation, check_invariants};
pub use engine::GameEngine;
pub use position::Position;
pub use rules::{check_winner, is_full, winning_lines};
pub use types::{Board, Cell, GameState, GameStatus, Mark};
