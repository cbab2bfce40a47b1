//! Error type shared by every pipeline stage and the orchestrator.

use crate::games::tictactoe::MoveError;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

/// Result of any pipeline stage.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// What went wrong, independent of where.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
pub enum PipelineErrorKind {
    /// Target lies outside the board.
    OutOfBounds,
    /// Target cell is already taken.
    CellOccupied,
    /// The mark is not the one to move.
    WrongTurn,
    /// The game has already been won or drawn.
    GameAlreadyOver,
    /// The analysis capability missed its deadline.
    AnalysisTimeout,
    /// The analysis capability failed or replied with garbage.
    AnalysisError,
    /// The decision capability missed its deadline.
    DecisionTimeout,
    /// The decision capability failed or replied with garbage.
    DecisionError,
    /// The execution stage overran its bound.
    ExecutionTimeout,
    /// The whole run missed its overall deadline.
    PipelineTimeout,
    /// No empty cell is left to play.
    NoLegalMoves,
    /// A post-move invariant failed.
    InvariantViolation,
}

/// How an error kind is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
pub enum ErrorCategory {
    /// Caller supplied an illegal move; surfaced as-is.
    Validation,
    /// A delegated capability misbehaved; absorbed by fallback.
    Capability,
    /// The pipeline cannot produce a move at all.
    Fatal,
}

impl PipelineErrorKind {
    /// Category that decides how the error propagates.
    pub fn category(self) -> ErrorCategory {
        match self {
            Self::OutOfBounds | Self::CellOccupied | Self::WrongTurn | Self::GameAlreadyOver => {
                ErrorCategory::Validation
            }
            Self::AnalysisTimeout
            | Self::AnalysisError
            | Self::DecisionTimeout
            | Self::DecisionError
            | Self::ExecutionTimeout
            | Self::PipelineTimeout => ErrorCategory::Capability,
            Self::NoLegalMoves | Self::InvariantViolation => ErrorCategory::Fatal,
        }
    }

    /// Whether repeating the same request could succeed.
    ///
    /// Always false: validation errors need a different move, capability
    /// errors have already been replaced by a fallback, and fatal errors
    /// describe a finished game.
    pub fn is_retryable(self) -> bool {
        false
    }
}

/// Pipeline error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("{}: {} at {}:{}", kind, message, file, line)]
pub struct PipelineError {
    /// Error kind.
    pub kind: PipelineErrorKind,
    /// Error message.
    pub message: String,
    /// Free-form diagnostic context (stage, elapsed time, ...).
    pub metadata: BTreeMap<String, String>,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl PipelineError {
    /// Creates a new pipeline error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(kind: PipelineErrorKind, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        let message = message.into();
        debug!(%kind, error_message = %message, "Pipeline error created");
        Self {
            kind,
            message,
            metadata: BTreeMap::new(),
            line: loc.line(),
            file: loc.file(),
        }
    }

    /// Attaches a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    /// Returns the error kind.
    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }
}

impl From<MoveError> for PipelineError {
    #[track_caller]
    fn from(err: MoveError) -> Self {
        let kind = match &err {
            MoveError::OutOfBounds(..) => PipelineErrorKind::OutOfBounds,
            MoveError::CellOccupied(_) => PipelineErrorKind::CellOccupied,
            MoveError::GameAlreadyOver => PipelineErrorKind::GameAlreadyOver,
            MoveError::WrongTurn(_) => PipelineErrorKind::WrongTurn,
            MoveError::InvariantViolation(_) => PipelineErrorKind::InvariantViolation,
        };
        Self::new(kind, err.to_string())
    }
}
