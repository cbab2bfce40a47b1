//! Three-stage decision pipeline for the AI side of a game.
//!
//! A turn flows scout → strategist → executor. The scout and strategist
//! delegate to pluggable capabilities under per-stage deadlines and fall
//! back to the rule engine when a capability is slow, fails, or proposes
//! an unplayable cell. The executor is the only stage that touches game
//! state, and it only ever produces a new state.

mod bounded;
mod capability;
mod config;
mod error;
mod executor;
mod model;
mod orchestrator;
mod prompt;
mod scout;
mod strategist;

pub use capability::{
    AnalysisCapability, CapabilityError, DecisionCapability, LanguageModel, PromptContext,
};
pub use config::{MAX_BOARD_SIZE, MIN_BOARD_SIZE, PipelineConfig};
pub use error::{ErrorCategory, PipelineError, PipelineErrorKind, PipelineResult};
pub use executor::ExecutionStage;
pub use model::{
    BoardAnalysis, MoveDecision, MoveExecution, PipelineOutcome, PipelinePhase, Stage,
    StageDiagnostic, StageDurations, StageReport,
};
pub use orchestrator::PipelineOrchestrator;
pub use prompt::{AnalysisReply, DecisionReply, parse_reply};
pub use scout::{AnalysisStage, LlmAnalysis, RuleBasedAnalysis, analyze_board};
pub use strategist::{DecisionStage, LlmStrategy, RuleBasedStrategy, decide_by_rules};
