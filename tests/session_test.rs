//! Tests for the session registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use strictly_pipeline::{
    AnalysisCapability, BoardAnalysis, CapabilityError, DecisionCapability, GameState,
    GameStatus, Mark, MoveDecision, MoveError, PipelineConfig, PipelineOrchestrator, Position,
    RuleBasedAnalysis, RuleBasedStrategy, SessionErrorKind, SessionManager, analyze_board,
};

/// Rule-based analysis that takes its time.
#[derive(Debug)]
struct Slow(Duration);

#[async_trait::async_trait]
impl AnalysisCapability for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn analyze(
        &self,
        state: &GameState,
        own_mark: Mark,
        win_length: usize,
        _deadline: tokio::time::Instant,
    ) -> Result<BoardAnalysis, CapabilityError> {
        tokio::time::sleep(self.0).await;
        Ok(analyze_board(state.board(), own_mark, win_length))
    }
}

/// Sets its flag when dropped.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Analysis that never finishes and records when its call is dropped.
#[derive(Debug)]
struct Abandoned(Arc<AtomicBool>);

#[async_trait::async_trait]
impl AnalysisCapability for Abandoned {
    fn name(&self) -> &str {
        "abandoned"
    }

    async fn analyze(
        &self,
        _state: &GameState,
        _own_mark: Mark,
        _win_length: usize,
        _deadline: tokio::time::Instant,
    ) -> Result<BoardAnalysis, CapabilityError> {
        let _flag = DropFlag(Arc::clone(&self.0));
        std::future::pending().await
    }
}

/// Strategy that always takes the highest empty cell.
#[derive(Debug)]
struct LastEmpty;

#[async_trait::async_trait]
impl DecisionCapability for LastEmpty {
    fn name(&self) -> &str {
        "last-empty"
    }

    async fn decide(
        &self,
        analysis: &BoardAnalysis,
        _state: &GameState,
        _deadline: tokio::time::Instant,
    ) -> Result<MoveDecision, CapabilityError> {
        let target = analysis
            .empty_cells
            .iter()
            .max()
            .copied()
            .ok_or_else(|| CapabilityError::new("no empty cell"))?;
        Ok(MoveDecision::new(target, "last empty cell".to_string(), 1.0))
    }
}

fn slow_manager(delay_ms: u64) -> SessionManager {
    let config = PipelineConfig::new();
    let orchestrator = PipelineOrchestrator::new(
        &config,
        Arc::new(Slow(Duration::from_millis(delay_ms))),
        Arc::new(RuleBasedStrategy),
    );
    SessionManager::new(orchestrator, Mark::O, Mark::X)
}

async fn play_opening(manager: &SessionManager) -> String {
    let (id, _) = manager.create_session(Some(Mark::X)).await;
    manager
        .submit_player_move(&id, Position::new(0, 0))
        .await
        .unwrap();
    manager.run_ai_turn(&id).await.unwrap();
    id
}

#[tokio::test]
async fn test_move_on_won_game_rejected() {
    let manager = SessionManager::rule_based(&PipelineConfig::new()).unwrap();
    let (id, _) = manager.create_session(Some(Mark::O)).await;

    // O (the AI) opens in the center; X then plays badly until O wins.
    let mut human_moves = [(0, 1), (2, 1), (0, 2), (2, 0)].into_iter();
    loop {
        let state = manager.get_session_state(&id).await.unwrap();
        if state.status().is_terminal() {
            break;
        }
        if state.current_player() == Mark::O {
            manager.run_ai_turn(&id).await.unwrap();
        } else {
            let next = human_moves
                .by_ref()
                .map(|(r, c)| Position::new(r, c))
                .find(|p| state.board().is_empty(*p))
                .unwrap();
            manager.submit_player_move(&id, next).await.unwrap();
        }
    }

    let before = manager.get_session_state(&id).await.unwrap();
    assert_eq!(before.status(), GameStatus::Won(Mark::O));

    let empty = before.board().empty_positions()[0];
    let err = manager.submit_player_move(&id, empty).await.unwrap_err();
    assert_eq!(err.kind, SessionErrorKind::Move(MoveError::GameAlreadyOver));

    let after = manager.get_session_state(&id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_human_cannot_move_twice() {
    let manager = SessionManager::rule_based(&PipelineConfig::new()).unwrap();
    let (id, _) = manager.create_session(None).await;
    manager.submit_player_move(&id, Position::new(0, 0)).await.unwrap();

    let err = manager
        .submit_player_move(&id, Position::new(0, 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind, SessionErrorKind::Move(MoveError::WrongTurn(Mark::X)));
}

#[tokio::test]
async fn test_busy_session_rejects_second_request() {
    let manager = slow_manager(300);
    let (id, _) = manager.create_session(Some(Mark::O)).await;

    let background = manager.clone();
    let ai_id = id.clone();
    let ai_turn = tokio::spawn(async move { background.run_ai_turn(&ai_id).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let err = manager
        .submit_player_move(&id, Position::new(0, 0))
        .await
        .unwrap_err();
    assert_eq!(err.kind, SessionErrorKind::Busy(id.clone()));
    let err = manager.reset_session(&id).await.unwrap_err();
    assert_eq!(err.kind, SessionErrorKind::Busy(id.clone()));

    let outcome = ai_turn.await.unwrap().unwrap();
    assert_eq!(outcome.chosen_move().mark, Mark::O);

    // The snapshot reflects the committed AI move.
    let state = manager.get_session_state(&id).await.unwrap();
    assert_eq!(state.move_count(), 1);
}

#[tokio::test]
async fn test_independent_sessions_run_in_parallel() {
    let manager = slow_manager(200);
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(manager.create_session(Some(Mark::O)).await.0);
    }

    let start = std::time::Instant::now();
    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.run_ai_turn(&id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Four serialized turns would need at least 800 ms.
    assert!(start.elapsed() < Duration::from_millis(700));
}

#[tokio::test]
async fn test_reset_keeps_id_and_clears_history() {
    let manager = SessionManager::rule_based(&PipelineConfig::new()).unwrap();
    let id = play_opening(&manager).await;
    let played = manager.get_session_state(&id).await.unwrap();
    assert_eq!(played.move_count(), 2);

    let fresh = manager.reset_session(&id).await.unwrap();
    assert_eq!(fresh.move_count(), 0);
    assert!(fresh.history().is_empty());
    assert_eq!(fresh.status(), GameStatus::InProgress);
    assert_eq!(fresh.first_player(), Mark::X);
    assert_eq!(manager.get_session_state(&id).await.unwrap(), fresh);
}

#[tokio::test]
async fn test_list_sessions_oldest_first() {
    let manager = SessionManager::rule_based(&PipelineConfig::new()).unwrap();
    let (first, _) = manager.create_session(None).await;
    let (second, _) = manager.create_session(None).await;

    let summaries = manager.list_sessions().await;
    let ids: Vec<_> = summaries.iter().map(|s| s.id.clone()).collect();
    assert_eq!(ids, vec![first, second]);
    assert!(summaries.iter().all(|s| s.ai_mark == Mark::O));
}

#[tokio::test]
async fn test_larger_board_sessions() {
    let config = PipelineConfig::new().with_board_size(5).with_win_length(4);
    let manager = SessionManager::rule_based(&config).unwrap();
    let (id, state) = manager.create_session(None).await;
    assert_eq!(state.board().size(), 5);

    manager.submit_player_move(&id, Position::new(4, 4)).await.unwrap();
    let outcome = manager.run_ai_turn(&id).await.unwrap();
    assert_eq!(outcome.chosen_move().position, Position::new(2, 2));
}

#[tokio::test]
async fn test_cancelled_ai_turn_leaves_session_untouched() {
    let dropped = Arc::new(AtomicBool::new(false));
    let config = PipelineConfig::new();
    let orchestrator = PipelineOrchestrator::new(
        &config,
        Arc::new(Abandoned(Arc::clone(&dropped))),
        Arc::new(RuleBasedStrategy),
    );
    let manager = SessionManager::new(orchestrator, Mark::O, Mark::X);
    let (id, _) = manager.create_session(Some(Mark::O)).await;

    let background = manager.clone();
    let ai_id = id.clone();
    let ai_turn = tokio::spawn(async move { background.run_ai_turn(&ai_id).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    ai_turn.abort();
    assert!(ai_turn.await.unwrap_err().is_cancelled());

    // The capability task is aborted asynchronously.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(dropped.load(Ordering::SeqCst));

    let state = manager.get_session_state(&id).await.unwrap();
    assert_eq!(state.move_count(), 0);
    let fresh = manager.reset_session(&id).await.unwrap();
    assert_eq!(fresh.current_player(), Mark::O);
}

#[tokio::test]
async fn test_player_moves_use_orchestrator_win_length() {
    let config = PipelineConfig::new().with_board_size(4).with_win_length(3);
    let orchestrator =
        PipelineOrchestrator::new(&config, Arc::new(RuleBasedAnalysis), Arc::new(LastEmpty));
    let manager = SessionManager::new(orchestrator, Mark::O, Mark::X);
    let (id, state) = manager.create_session(None).await;
    assert_eq!(state.board().size(), 4);

    for col in 0..2 {
        manager.submit_player_move(&id, Position::new(0, col)).await.unwrap();
        manager.run_ai_turn(&id).await.unwrap();
    }
    let state = manager
        .submit_player_move(&id, Position::new(0, 2))
        .await
        .unwrap();

    // Three in a row wins on this board even though it is four wide.
    assert_eq!(state.status(), GameStatus::Won(Mark::X));
}

#[test]
fn test_invalid_config_rejected() {
    let config = PipelineConfig::new().with_board_size(12);
    let err = SessionManager::rule_based(&config).unwrap_err();
    assert!(err.message.contains("board_size"));
}
