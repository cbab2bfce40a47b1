//! Strictly Pipeline - a deadline-bounded decision pipeline for board games
//!
//! An AI turn runs through three stages: a scout that analyses the board,
//! a strategist that picks a cell, and an executor that applies it through
//! the rules engine. Scout and strategist delegate to pluggable
//! capabilities (rule engine or language model) and fall back to the rule
//! engine whenever a capability is slow or wrong, so every turn ends in a
//! legal move within a bounded time.
//!
//! # Architecture
//!
//! - **Games**: N×N tic-tac-toe with a configurable winning line length
//! - **Pipeline**: scout, strategist, executor and the orchestrator
//! - **LLM client**: OpenAI and Anthropic backends for delegated stages
//! - **Session**: in-memory registry with one lock per game
//!
//! # Example
//!
//! ```no_run
//! use strictly_pipeline::{GameState, Mark, PipelineConfig, PipelineOrchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::new();
//! let orchestrator = PipelineOrchestrator::rule_based(&config);
//!
//! let state = GameState::new(*config.board_size(), Mark::X);
//! let outcome = orchestrator.run(&state).await?;
//! println!("{}", outcome.chosen_move());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// Private module declarations
mod agent_config;
mod games;
mod llm_client;
mod pipeline;
mod session;

// Crate-level exports - Agent configuration
pub use agent_config::{AgentConfig, CapabilityKind, ConfigError};

// Crate-level exports - LLM client
pub use llm_client::{LlmClient, LlmConfig, LlmError, LlmProvider};

// Crate-level exports - Session management
pub use session::{SessionError, SessionErrorKind, SessionId, SessionManager, SessionSummary};

// Crate-level exports - Pipeline
pub use pipeline::{
    AnalysisCapability, AnalysisReply, AnalysisStage, BoardAnalysis, CapabilityError,
    DecisionCapability, DecisionReply, DecisionStage, ErrorCategory, ExecutionStage,
    LanguageModel, LlmAnalysis, LlmStrategy, MAX_BOARD_SIZE, MIN_BOARD_SIZE, MoveDecision,
    MoveExecution, PipelineConfig, PipelineError, PipelineErrorKind, PipelineOrchestrator,
    PipelineOutcome, PipelinePhase, PipelineResult, PromptContext, RuleBasedAnalysis,
    RuleBasedStrategy, Stage, StageDiagnostic, StageDurations, StageReport, analyze_board,
    decide_by_rules, parse_reply,
};

// Crate-level exports - Game types (tic-tac-toe)
pub use games::tictactoe::{
    Board, Cell, GameEngine, GameState, GameStatus, HistoryConsistent, Mark, Move, MoveError,
    Position, TurnAlternation, check_invariants, check_winner, is_full, winning_lines,
};
