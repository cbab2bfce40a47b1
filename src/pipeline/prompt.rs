//! Prompt rendering and reply parsing for language-model capabilities.

use super::capability::CapabilityError;
use super::model::BoardAnalysis;
use crate::games::tictactoe::{GameState, Mark, Position};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Reply expected from the analysis prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisReply {
    /// Empty cells where the opponent would complete a line next move.
    #[serde(default)]
    pub threats: Vec<Position>,
    /// Empty cells where you would complete a line next move.
    #[serde(default)]
    pub opportunities: Vec<Position>,
    /// How sure you are, from 0.0 to 1.0.
    pub confidence: f64,
}

/// Reply expected from the decision prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DecisionReply {
    /// Zero-based row of the chosen cell.
    pub row: usize,
    /// Zero-based column of the chosen cell.
    pub col: usize,
    /// One sentence explaining the choice.
    #[serde(default)]
    pub reasoning: String,
    /// How sure you are, from 0.0 to 1.0.
    pub confidence: f64,
}

fn schema_text<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

fn describe_board(state: &GameState) -> String {
    let board = state.board();
    let mut text = String::new();
    for row in 0..board.size() {
        let cells: Vec<String> = (0..board.size())
            .map(|col| match board.get(Position::new(row, col)).and_then(|c| c.mark()) {
                Some(mark) => mark.to_string(),
                None => "_".to_string(),
            })
            .collect();
        text.push_str(&cells.join(" "));
        text.push('\n');
    }
    text
}

/// System prompt shared by both capabilities.
pub fn system_prompt(role: &str) -> String {
    format!(
        "You are the {} in a tic-tac-toe decision pipeline. \
         Reply with a single JSON object matching the given schema and nothing else. \
         Coordinates are zero-based (row, col).",
        role
    )
}

/// Renders the analysis question.
#[instrument(skip(state))]
pub fn analysis_prompt(state: &GameState, own_mark: Mark, win_length: usize) -> String {
    format!(
        "Board ({n}x{n}, '_' is empty, {k} in a row wins):\n{board}\n\
         You play {own}; the opponent plays {opp}.\n\
         List every empty cell where {own} completes a line next move (opportunities) \
         and every empty cell where {opp} does (threats).\n\
         JSON schema:\n{schema}",
        n = state.board().size(),
        k = win_length,
        board = describe_board(state),
        own = own_mark,
        opp = own_mark.opponent(),
        schema = schema_text::<AnalysisReply>(),
    )
}

/// Renders the decision question.
#[instrument(skip(analysis, state))]
pub fn decision_prompt(analysis: &BoardAnalysis, state: &GameState) -> String {
    let analysis_json =
        serde_json::to_string(analysis).unwrap_or_else(|_| "{}".to_string());
    format!(
        "Board ({n}x{n}, '_' is empty):\n{board}\n\
         You play {own}. Analysis of the position:\n{analysis}\n\
         Choose one empty cell to play.\n\
         JSON schema:\n{schema}",
        n = state.board().size(),
        board = describe_board(state),
        own = analysis.own_mark,
        analysis = analysis_json,
        schema = schema_text::<DecisionReply>(),
    )
}

/// Extracts and parses the first JSON object in a model reply.
///
/// Models like to wrap JSON in prose or code fences; everything outside
/// the outermost braces is ignored.
#[instrument(skip(text), fields(len = text.len()))]
pub fn parse_reply<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, CapabilityError> {
    let start = text.find('{');
    let end = text.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => {
            warn!("No JSON object in reply");
            return Err(CapabilityError::new("reply contains no JSON object"));
        }
    };
    debug!(json_len = json.len(), "Parsing reply");
    serde_json::from_str(json)
        .map_err(|e| CapabilityError::new(format!("malformed reply: {}", e)))
}

/// Clamps a model-reported confidence into `[0, 1]`; NaN becomes 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
