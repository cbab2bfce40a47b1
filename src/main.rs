//! Strictly Pipeline - terminal front end
//!
//! Plays tic-tac-toe against the scout/strategist/executor pipeline.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;
use strictly_pipeline::{
    AgentConfig, GameState, GameStatus, Mark, Position, SessionManager,
};
use tracing::{info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_agent_config(&cli.config)?;

    match cli.command {
        Command::Play { first } => run_play(&config, first).await,
        Command::Simulate { games } => run_simulate(&config, games).await,
        Command::ShowConfig => show_config(&config),
    }
}

#[instrument(skip(config_path), fields(path = %config_path.display()))]
fn load_agent_config(config_path: &Path) -> Result<AgentConfig> {
    if config_path.exists() {
        Ok(AgentConfig::from_file(config_path)?)
    } else {
        info!("Config file not found, using defaults");
        Ok(AgentConfig::default())
    }
}

fn show_config(config: &AgentConfig) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to render config")?;
    println!("{}", text);
    Ok(())
}

fn build_manager(config: &AgentConfig) -> Result<SessionManager> {
    let orchestrator = config.build_orchestrator()?;
    Ok(SessionManager::new(
        orchestrator,
        *config.ai_mark(),
        *config.first_player(),
    ))
}

/// Human vs pipeline on stdin/stdout.
#[instrument(skip(config), fields(agent = %config.name()))]
async fn run_play(config: &AgentConfig, first: Option<Mark>) -> Result<()> {
    let manager = build_manager(config)?;
    let (id, mut state) = manager.create_session(first).await;
    let human = manager.ai_mark().opponent();

    println!("You are {}. Enter a cell number or \"row,col\"; q to quit.", human);

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();

    while !state.status().is_terminal() {
        if state.current_player() == manager.ai_mark() {
            let outcome = manager.run_ai_turn(&id).await?;
            println!("AI plays {}: {}", outcome.chosen_move(), outcome.reasoning());
            for diagnostic in outcome.diagnostics() {
                println!("  ({} {}: {})", diagnostic.stage, diagnostic.kind, diagnostic.message);
            }
            state = outcome.into_state();
            continue;
        }

        println!("\n{}", state.board().display());
        print!("{} > ", human);
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        let input = line.trim();
        if input.eq_ignore_ascii_case("q") {
            break;
        }

        let Some(position) = Position::parse(input, state.board().size()) else {
            println!("Could not read {:?} as a cell", input);
            continue;
        };

        match manager.submit_player_move(&id, position).await {
            Ok(next) => state = next,
            Err(e) => println!("{}", e.kind),
        }
    }

    println!("\n{}", state.board().display());
    match state.status() {
        GameStatus::Won(mark) if mark == human => println!("You win!"),
        GameStatus::Won(mark) => println!("{} wins.", mark),
        GameStatus::Draw => println!("Draw."),
        GameStatus::InProgress => println!("Game abandoned."),
    }
    Ok(())
}

/// Pipeline vs pipeline, `games` times.
#[instrument(skip(config), fields(agent = %config.name()))]
async fn run_simulate(config: &AgentConfig, games: usize) -> Result<()> {
    let orchestrator = config.build_orchestrator()?;
    let mut results: BTreeMap<String, usize> = BTreeMap::new();
    let mut fallback_turns = 0usize;

    for game in 0..games {
        let mut state = GameState::new(*config.pipeline().board_size(), *config.first_player());
        while !state.status().is_terminal() {
            let outcome = orchestrator.run(&state).await?;
            if *outcome.fallback_used() {
                fallback_turns += 1;
            }
            state = outcome.into_state();
        }

        let label = match state.status() {
            GameStatus::Won(mark) => format!("{} wins", mark),
            _ => "draw".to_string(),
        };
        info!(game, result = %label, moves = state.move_count(), "Game finished");
        *results.entry(label).or_default() += 1;
    }

    if fallback_turns > 0 {
        warn!(fallback_turns, "Some turns used rule-based fallbacks");
    }
    for (label, count) in &results {
        println!("{:>8}: {}", label, count);
    }
    println!("fallback turns: {}", fallback_turns);
    Ok(())
}
