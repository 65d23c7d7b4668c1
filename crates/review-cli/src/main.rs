//! Game review from the command line.
//!
//! Evaluates positions with a UCI engine, scans a game for mistakes and
//! prints move text. Settings come from `review.toml` when present; flags
//! override them.

use std::sync::Arc;

use anyhow::Context;
use chess_analysis::{
    analyze_node_tactical, evaluate_at_depth, find_mistakes, CancellationFlag, ReviewConfig,
    UciEvaluator,
};
use chess_core::{position, Color, STARTPOS};
use chess_tree::GameTree;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::Mutex;

/// Review chess games with a UCI engine.
#[derive(Parser)]
#[command(name = "review")]
#[command(about = "Evaluate positions and review games with a UCI engine")]
struct Cli {
    /// Path to the UCI engine (overrides review.toml)
    #[arg(long, global = true)]
    engine: Option<String>,

    /// Search depth (overrides review.toml)
    #[arg(long, global = true)]
    depth: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate every legal move of a position and print the result as JSON
    Evaluate {
        /// Position in FEN notation
        #[arg(long, default_value = STARTPOS)]
        fen: String,
    },
    /// Analyze a game's moves and list blunders and inaccuracies as JSON
    Mistakes {
        /// Starting position in FEN notation
        #[arg(long, default_value = STARTPOS)]
        fen: String,
        /// Only report this side's moves
        #[arg(long)]
        color: Option<Side>,
        /// Moves in SAN, e.g. e4 e5 Nf3
        moves: Vec<String>,
    },
    /// Print the PGN of a line of SAN moves
    Line {
        /// Starting position in FEN notation
        #[arg(long, default_value = STARTPOS)]
        fen: String,
        /// Result tag, e.g. 1-0
        #[arg(long)]
        result: Option<String>,
        /// Moves in SAN, e.g. e4 e5 Nf3
        moves: Vec<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Side {
    White,
    Black,
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Color::White,
            Side::Black => Color::Black,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut config = ReviewConfig::load().context("Failed to load review.toml")?;
    if let Some(engine) = cli.engine {
        config.engine.path = engine;
    }
    if let Some(depth) = cli.depth {
        config.engine.depth = depth;
    }

    match cli.command {
        Command::Evaluate { fen } => evaluate(&config, &fen).await,
        Command::Mistakes { fen, color, moves } => {
            mistakes(&config, &fen, color.map(Color::from), &moves).await
        }
        Command::Line { fen, result, moves } => line(&fen, result.as_deref(), &moves),
    }
}

async fn evaluate(config: &ReviewConfig, fen: &str) -> anyhow::Result<()> {
    let legal = position::legal_moves(fen)?;
    if legal.is_empty() {
        anyhow::bail!("No legal moves in {}", fen);
    }

    let engine = UciEvaluator::spawn(&config.engine.path).await?;
    tracing::info!("Engine: {}", engine.name());

    let bundle = evaluate_at_depth(
        &engine,
        fen,
        legal.len(),
        config.engine.depth,
        &config.polling,
        &CancellationFlag::new(),
    )
    .await?
    .context("Engine returned no evaluation")?;

    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

async fn mistakes(
    config: &ReviewConfig,
    fen: &str,
    color: Option<Color>,
    moves: &[String],
) -> anyhow::Result<()> {
    let tree = GameTree::from_san_moves(fen, moves)?;
    let line = tree.main_line();
    let tree = Arc::new(Mutex::new(tree));

    let engine = UciEvaluator::spawn(&config.engine.path).await?;
    tracing::info!("Engine: {}", engine.name());

    let cancel = CancellationFlag::new();
    // The final position has no move to judge.
    for (ply, node) in line.iter().take(line.len().saturating_sub(1)).enumerate() {
        let outcome = analyze_node_tactical(
            &tree,
            *node,
            &engine,
            config.engine.depth,
            &config.polling,
            &cancel,
        )
        .await?;
        tracing::debug!("Ply {}: {:?}", ply, outcome);
    }

    let tree = tree.lock().await;
    let found = find_mistakes(&tree, &config.classifier, color)?;
    tracing::info!("Found {} mistakes in {} moves", found.len(), moves.len());
    println!("{}", serde_json::to_string_pretty(&found)?);
    Ok(())
}

fn line(fen: &str, result: Option<&str>, moves: &[String]) -> anyhow::Result<()> {
    let mut tree = GameTree::from_san_moves(fen, moves)?;
    if let Some(result) = result {
        tree.set_result(result, None);
    }
    print!("{}", tree.to_pgn(false)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_overrides() {
        let cli = Cli::parse_from(["review", "--depth", "8", "evaluate"]);
        assert_eq!(cli.depth, Some(8));
        assert!(matches!(cli.command, Command::Evaluate { ref fen } if fen == STARTPOS));
    }

    #[test]
    fn parses_line_moves() {
        let cli = Cli::parse_from(["review", "line", "--result", "1-0", "e4", "e5"]);
        match cli.command {
            Command::Line { moves, result, .. } => {
                assert_eq!(moves, vec!["e4", "e5"]);
                assert_eq!(result.as_deref(), Some("1-0"));
            }
            _ => panic!("expected line command"),
        }
    }

    #[test]
    fn parses_color_filter() {
        let cli = Cli::parse_from(["review", "mistakes", "--color", "black", "e4"]);
        match cli.command {
            Command::Mistakes { color, .. } => {
                assert_eq!(color.map(Color::from), Some(Color::Black));
            }
            _ => panic!("expected mistakes command"),
        }
    }

    #[test]
    fn line_rejects_illegal_moves() {
        let moves = vec!["e4".to_string(), "e4".to_string()];
        assert!(line(STARTPOS, None, &moves).is_err());
    }
}
