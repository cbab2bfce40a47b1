//! Pluggable decision capabilities.
//!
//! The scout and strategist each delegate to a capability chosen when the
//! session is configured: a deterministic rule engine, or an adapter over a
//! [`LanguageModel`]. Stages never inspect which one they hold.

use super::model::{BoardAnalysis, MoveDecision};
use crate::games::tictactoe::{GameState, Mark};
use crate::llm_client::LlmError;
use derive_more::{Display, Error};
use tokio::time::Instant;
use tracing::{error, instrument};

/// Prompt handed to a language model, with the caller's deadline.
#[derive(Debug, Clone, derive_new::new)]
pub struct PromptContext {
    /// Instructions for the model.
    pub system: String,
    /// The question, including board and expected reply format.
    pub user: String,
    /// Point after which the reply is useless to the caller.
    pub deadline: Instant,
}

impl PromptContext {
    /// Time left until the deadline, saturating at zero.
    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Text-completion backend.
///
/// Implementations must tolerate being dropped mid-call: the pipeline
/// abandons calls that run past their deadline.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync + std::fmt::Debug {
    /// Completes the prompt, returning raw model text.
    async fn complete(&self, prompt: &PromptContext) -> Result<String, LlmError>;

    /// Model identifier for logs.
    fn model_name(&self) -> &str;
}

/// Produces a board analysis for the mark to move.
#[async_trait::async_trait]
pub trait AnalysisCapability: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Analyses `state` from `own_mark`'s perspective.
    async fn analyze(
        &self,
        state: &GameState,
        own_mark: Mark,
        win_length: usize,
        deadline: Instant,
    ) -> Result<BoardAnalysis, CapabilityError>;
}

/// Picks a target cell from an analysis.
#[async_trait::async_trait]
pub trait DecisionCapability: Send + Sync {
    /// Short name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Chooses a cell to play.
    async fn decide(
        &self,
        analysis: &BoardAnalysis,
        state: &GameState,
        deadline: Instant,
    ) -> Result<MoveDecision, CapabilityError>;
}

/// Failure inside a capability.
#[derive(Debug, Clone, Display, Error)]
#[display("Capability error: {} at {}:{}", message, file, line)]
pub struct CapabilityError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl CapabilityError {
    /// Creates a new capability error with caller location tracking.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        let message = message.into();
        error!(error_message = %message, "Capability error created");
        Self {
            message,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<LlmError> for CapabilityError {
    #[track_caller]
    fn from(err: LlmError) -> Self {
        Self::new(err.message)
    }
}
