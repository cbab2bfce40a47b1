//! In-memory registry of game sessions.
//!
//! Each session owns one [`GameState`] behind its own lock, so independent
//! sessions never wait on each other. A mutating call on a session that is
//! already busy (typically mid AI turn) is rejected rather than queued.

use crate::agent_config::ConfigError;
use crate::games::tictactoe::{GameEngine, GameState, Mark, MoveError, Position};
use crate::pipeline::{PipelineConfig, PipelineError, PipelineErrorKind, PipelineOrchestrator, PipelineOutcome};
use chrono::{DateTime, Utc};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

/// Unique identifier for a game session.
pub type SessionId = String;

/// Immutable facts about a session, readable without its lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session ID.
    pub id: SessionId,
    /// Mark played by the pipeline.
    pub ai_mark: Mark,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct SessionEntry {
    summary: SessionSummary,
    state: Arc<Mutex<GameState>>,
}

/// Manages all game sessions.
///
/// The orchestrator is shared: its stages are stateless, so one instance
/// serves every session.
#[derive(Debug, Clone)]
pub struct SessionManager {
    sessions: Arc<RwLock<HashMap<SessionId, SessionEntry>>>,
    orchestrator: Arc<PipelineOrchestrator>,
    engine: GameEngine,
    board_size: usize,
    ai_mark: Mark,
    first_player: Mark,
    next_id: Arc<AtomicU64>,
}

impl SessionManager {
    /// Creates a session manager running `orchestrator` for `ai_mark`.
    ///
    /// Board size and the engine for human moves come from the
    /// orchestrator, so both sides always play by the same rules.
    #[instrument(skip(orchestrator))]
    pub fn new(orchestrator: PipelineOrchestrator, ai_mark: Mark, first_player: Mark) -> Self {
        let engine = orchestrator.engine();
        let board_size = orchestrator.board_size();
        info!(board_size, win_length = engine.win_length(), "Creating session manager");
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            orchestrator: Arc::new(orchestrator),
            engine,
            board_size,
            ai_mark,
            first_player,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Creates a manager whose AI plays O with the rule engine only.
    ///
    /// Fails when `config` does not validate.
    pub fn rule_based(config: &PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::new(
            PipelineOrchestrator::rule_based(config),
            Mark::O,
            Mark::X,
        ))
    }

    /// Mark played by the pipeline in every session.
    pub fn ai_mark(&self) -> Mark {
        self.ai_mark
    }

    /// Creates a new session with an empty board.
    ///
    /// `first_player` overrides the manager's default opener.
    #[instrument(skip(self))]
    pub async fn create_session(&self, first_player: Option<Mark>) -> (SessionId, GameState) {
        let id = format!("session-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let state = GameState::new(self.board_size, first_player.unwrap_or(self.first_player));
        let entry = SessionEntry {
            summary: SessionSummary {
                id: id.clone(),
                ai_mark: self.ai_mark,
                created_at: Utc::now(),
            },
            state: Arc::new(Mutex::new(state.clone())),
        };

        self.sessions.write().await.insert(id.clone(), entry);
        info!(session_id = %id, first_player = %state.first_player(), "Created new session");
        (id, state)
    }

    /// Applies the human's move.
    ///
    /// The human plays the opponent of the AI mark; a rejected move leaves
    /// the session untouched.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn submit_player_move(
        &self,
        id: &str,
        position: Position,
    ) -> Result<GameState, SessionError> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.try_lock().map_err(|_| busy(id))?;

        let next = self
            .engine
            .apply_move(&state, position, self.ai_mark.opponent())
            .map_err(|e| {
                warn!(error = %e, "Player move rejected");
                SessionError::new(SessionErrorKind::Move(e))
            })?;

        *state = next.clone();
        debug!(status = ?next.status(), "Player move committed");
        Ok(next)
    }

    /// Runs the pipeline for the AI's move and commits the result.
    ///
    /// The session stays locked for the whole run. Nothing is committed
    /// unless the pipeline produces an outcome.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn run_ai_turn(&self, id: &str) -> Result<PipelineOutcome, SessionError> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.try_lock().map_err(|_| busy(id))?;

        if !state.status().is_terminal() && state.current_player() != self.ai_mark {
            warn!(to_move = %state.current_player(), "AI turn requested on the player's turn");
            return Err(SessionError::new(SessionErrorKind::Move(MoveError::WrongTurn(
                self.ai_mark,
            ))));
        }

        let outcome = self
            .orchestrator
            .run(&state)
            .await
            .map_err(SessionError::from)?;

        *state = outcome.updated_state().clone();
        info!(chosen_move = %outcome.chosen_move(), fallback_used = outcome.fallback_used(), "AI move committed");
        Ok(outcome)
    }

    /// Snapshot of the session's state.
    ///
    /// Waits for an in-flight AI turn to finish.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn get_session_state(&self, id: &str) -> Result<GameState, SessionError> {
        let entry = self.entry(id).await?;
        let state = entry.state.lock().await;
        Ok(state.clone())
    }

    /// Puts the session back to an empty board, keeping its ID and opener.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn reset_session(&self, id: &str) -> Result<GameState, SessionError> {
        let entry = self.entry(id).await?;
        let mut state = entry.state.try_lock().map_err(|_| busy(id))?;
        let first_player = state.first_player();
        *state = GameState::new(self.board_size, first_player);
        info!("Session reset");
        Ok(state.clone())
    }

    /// Lists all sessions, oldest first.
    #[instrument(skip(self))]
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().await;
        let mut summaries: Vec<_> = sessions.values().map(|e| e.summary.clone()).collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        debug!(count = summaries.len(), "Listed sessions");
        summaries
    }

    /// Drops a session, returning its final state.
    #[instrument(skip(self), fields(session_id = %id))]
    pub async fn remove_session(&self, id: &str) -> Result<GameState, SessionError> {
        let entry = self
            .sessions
            .write()
            .await
            .remove(id)
            .ok_or_else(|| not_found(id))?;
        let state = entry.state.lock().await;
        info!("Session removed");
        Ok(state.clone())
    }

    async fn entry(&self, id: &str) -> Result<SessionEntry, SessionError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }
}

#[track_caller]
fn not_found(id: &str) -> SessionError {
    debug!(session_id = id, "Session not found");
    SessionError::new(SessionErrorKind::NotFound(id.to_string()))
}

#[track_caller]
fn busy(id: &str) -> SessionError {
    warn!(session_id = id, "Session busy, rejecting request");
    SessionError::new(SessionErrorKind::Busy(id.to_string()))
}

/// Why a session operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum SessionErrorKind {
    /// No session with this ID.
    #[display("Session {} not found", _0)]
    NotFound(SessionId),
    /// Another operation holds the session.
    #[display("Session {} is busy", _0)]
    Busy(SessionId),
    /// The engine rejected the move.
    #[display("{}", _0)]
    Move(MoveError),
    /// The pipeline could not produce a move.
    #[display("Pipeline failed with {}: {}", _0, _1)]
    Pipeline(PipelineErrorKind, String),
}

/// Session error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Session error: {} at {}:{}", kind, file, line)]
pub struct SessionError {
    /// What went wrong.
    pub kind: SessionErrorKind,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl SessionError {
    /// Creates a new session error with caller location tracking.
    #[track_caller]
    pub fn new(kind: SessionErrorKind) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            kind,
            line: loc.line(),
            file: loc.file(),
        }
    }
}

impl From<PipelineError> for SessionError {
    #[track_caller]
    fn from(err: PipelineError) -> Self {
        Self::new(SessionErrorKind::Pipeline(err.kind, err.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> SessionManager {
        SessionManager::rule_based(&PipelineConfig::new()).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_play() {
        let manager = manager();
        let (id, state) = manager.create_session(None).await;
        assert_eq!(state.current_player(), Mark::X);

        manager.submit_player_move(&id, Position::new(0, 0)).await.unwrap();
        let outcome = manager.run_ai_turn(&id).await.unwrap();
        assert_eq!(outcome.chosen_move().mark, Mark::O);

        let state = manager.get_session_state(&id).await.unwrap();
        assert_eq!(state.move_count(), 2);
    }

    #[tokio::test]
    async fn test_ai_turn_out_of_turn() {
        let manager = manager();
        let (id, _) = manager.create_session(Some(Mark::X)).await;
        let err = manager.run_ai_turn(&id).await.unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::Move(MoveError::WrongTurn(Mark::O)));
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let err = manager().get_session_state("nope").await.unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn test_busy_session_rejects_moves() {
        let manager = manager();
        let (id, _) = manager.create_session(None).await;
        let entry = manager.entry(&id).await.unwrap();
        let _held = entry.state.lock().await;

        let err = manager
            .submit_player_move(&id, Position::new(1, 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, SessionErrorKind::Busy(id.clone()));
    }

    #[tokio::test]
    async fn test_remove_session() {
        let manager = manager();
        let (id, _) = manager.create_session(None).await;
        assert_eq!(manager.list_sessions().await.len(), 1);
        manager.remove_session(&id).await.unwrap();
        assert!(manager.list_sessions().await.is_empty());
        assert!(manager.remove_session(&id).await.is_err());
    }
}
