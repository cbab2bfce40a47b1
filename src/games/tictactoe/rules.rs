//! Game rules for tic-tac-toe.
//!
//! This module contains pure functions for evaluating game state
//! according to tic-tac-toe rules. Rules are separated from board
//! storage so the engine and the analysis stage share one line model.

pub mod draw;
pub mod win;

pub use draw::is_full;
pub use win::{check_winner, winning_lines};
