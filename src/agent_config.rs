//! AI player configuration loaded from TOML.

use crate::games::tictactoe::Mark;
use crate::llm_client::{LlmClient, LlmConfig, LlmProvider};
use crate::pipeline::{
    AnalysisCapability, DecisionCapability, LanguageModel, LlmAnalysis, LlmStrategy,
    PipelineConfig, PipelineOrchestrator, RuleBasedAnalysis, RuleBasedStrategy,
};
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Backend for one delegated pipeline stage.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum CapabilityKind {
    /// Deterministic rule engine.
    #[default]
    Rules,
    /// Configured language model.
    Llm,
}

/// Configuration for the AI side of a game.
///
/// ```toml
/// name = "scout-strategist"
/// ai_mark = "O"
/// analysis = "rules"
/// decision = "llm"
/// llm_provider = "anthropic"
///
/// [pipeline]
/// board_size = 4
/// win_length = 3
/// ```
#[derive(Debug, Clone, Getters, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Display name of the AI player.
    #[serde(default = "default_name")]
    name: String,

    /// Mark the AI plays.
    #[serde(default = "default_ai_mark")]
    ai_mark: Mark,

    /// Mark that opens each game.
    #[serde(default = "default_first_player")]
    first_player: Mark,

    /// Backend for the scout.
    #[serde(default)]
    analysis: CapabilityKind,

    /// Backend for the strategist.
    #[serde(default)]
    decision: CapabilityKind,

    /// LLM provider (openai or anthropic).
    #[serde(default = "default_provider")]
    llm_provider: LlmProvider,

    /// LLM model name.
    #[serde(default = "default_model")]
    llm_model: String,

    /// Maximum tokens for LLM responses.
    #[serde(default = "default_max_tokens")]
    llm_max_tokens: u32,

    /// Timeouts and board geometry.
    #[serde(default)]
    pipeline: PipelineConfig,
}

fn default_name() -> String {
    "pipeline".to_string()
}

fn default_ai_mark() -> Mark {
    Mark::O
}

fn default_first_player() -> Mark {
    Mark::X
}

fn default_provider() -> LlmProvider {
    LlmProvider::OpenAI
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    300
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::new(default_name())
    }
}

impl AgentConfig {
    /// Creates a rule-based configuration with default timeouts.
    #[instrument(skip(name), fields(agent_name = %name))]
    pub fn new(name: String) -> Self {
        Self {
            name,
            ai_mark: default_ai_mark(),
            first_player: default_first_player(),
            analysis: CapabilityKind::default(),
            decision: CapabilityKind::default(),
            llm_provider: default_provider(),
            llm_model: default_model(),
            llm_max_tokens: default_max_tokens(),
            pipeline: PipelineConfig::default(),
        }
    }

    /// Loads and validates configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        config.pipeline.validate()?;

        info!(
            agent_name = %config.name,
            analysis = %config.analysis,
            decision = %config.decision,
            board_size = config.pipeline.board_size(),
            "Config loaded successfully"
        );
        Ok(config)
    }

    /// Whether any stage needs a language model.
    pub fn uses_llm(&self) -> bool {
        self.analysis == CapabilityKind::Llm || self.decision == CapabilityKind::Llm
    }

    /// Creates LLM configuration from this agent config.
    ///
    /// Requires OPENAI_API_KEY or ANTHROPIC_API_KEY in the environment.
    #[instrument(skip(self), fields(provider = %self.llm_provider, model = %self.llm_model))]
    pub fn create_llm_config(&self) -> Result<LlmConfig, ConfigError> {
        let var = match self.llm_provider {
            LlmProvider::OpenAI => "OPENAI_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
        };
        let api_key = std::env::var(var)
            .map_err(|_| ConfigError::new(format!("{} environment variable not set", var)))?;

        Ok(LlmConfig::new(
            self.llm_provider,
            api_key,
            self.llm_model.clone(),
            self.llm_max_tokens,
        ))
    }

    /// Builds the orchestrator described by this configuration.
    ///
    /// The language model is only constructed (and its key only required)
    /// when at least one stage is set to `llm`.
    #[instrument(skip(self), fields(agent_name = %self.name))]
    pub fn build_orchestrator(&self) -> Result<PipelineOrchestrator, ConfigError> {
        self.pipeline.validate()?;

        let model: Option<Arc<dyn LanguageModel>> = if self.uses_llm() {
            Some(Arc::new(LlmClient::new(self.create_llm_config()?)))
        } else {
            None
        };

        let analysis: Arc<dyn AnalysisCapability> = match (&self.analysis, &model) {
            (CapabilityKind::Llm, Some(model)) => Arc::new(LlmAnalysis::new(Arc::clone(model))),
            _ => Arc::new(RuleBasedAnalysis),
        };
        let decision: Arc<dyn DecisionCapability> = match (&self.decision, &model) {
            (CapabilityKind::Llm, Some(model)) => Arc::new(LlmStrategy::new(Arc::clone(model))),
            _ => Arc::new(RuleBasedStrategy),
        };

        Ok(PipelineOrchestrator::new(&self.pipeline, analysis, decision))
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}
