//! Chess game analysis on top of the move tree.
//!
//! This crate turns engine and human-move model output into judgements
//! about moves.
//!
//! # Overview
//!
//! - [`translate`] - Raw per-move engine scores to an [`EvaluationBundle`](chess_core::EvaluationBundle)
//! - [`cp_to_winrate`] - Centipawn to win-rate transform
//! - [`classify_move`] - Blunder / inaccuracy / excellent / best verdicts
//! - [`find_mistakes`] - Blunders and inaccuracies of a game's mainline
//! - [`TacticalEvaluator`] and [`MoveProbabilityModel`] - Evaluator interfaces
//! - [`UciEvaluator`] - Tactical evaluator backed by a UCI engine like Stockfish
//! - [`analyze_node_tactical`] and [`analyze_node_human`] - Fill node analysis
//! - [`Aggregator`] - Expected win-rate of candidate moves against likely replies
//! - [`ReviewConfig`] - Settings loaded from `review.toml`
//!
//! # Example
//!
//! ```ignore
//! use chess_analysis::{Aggregator, CancellationFlag, ReviewConfig, UciEvaluator};
//!
//! let config = ReviewConfig::load()?;
//! let engine = UciEvaluator::spawn(&config.engine.path).await?;
//! let aggregator = Aggregator::new(engine, model).with_poll(config.polling.clone());
//! let result = aggregator
//!     .analyze(fen, &config.aggregator, &CancellationFlag::new())
//!     .await?;
//! println!("best: {}", result.best().map(|m| m.san.as_str()).unwrap_or("-"));
//! ```

pub mod aggregator;
pub mod book;
pub mod classify;
pub mod config;
pub mod driver;
pub mod engine;
pub mod evaluator;
pub mod mistakes;
pub mod translate;
pub mod winrate;

pub use aggregator::{
    Aggregator, AggregatorError, ExpansionNode, ExpansionTree, ExpectedWinrateParams,
    ExpectedWinrateResult, LeafEvaluation, MoveOutcome, DEFAULT_CACHE_CAPACITY,
};
pub use book::{merge_policy, BookEntry, BookError, BookMove, JsonOpeningBook, OpeningBook};
pub use classify::{
    classify_move, classify_node_move, weighted_average_winrate, ClassifierConfig,
    MoveClassification, MoveQuality,
};
pub use config::{ConfigError, EngineConfig, ReviewConfig};
pub use driver::{analyze_node_human, analyze_node_tactical, AnalysisError, AnalysisOutcome};
pub use engine::{parse_info_line, InfoLine, UciEvaluator};
pub use evaluator::{
    evaluate_all_buckets, evaluate_at_depth, wait_for_model, wait_until_ready, CancellationFlag,
    EvaluationStream, EvaluatorError, ModelStatus, MoveProbabilityModel, PollConfig,
    TacticalEvaluator,
};
pub use mistakes::{find_mistakes, MistakePosition};
pub use translate::translate;
pub use winrate::{cp_text_to_winrate, cp_to_winrate};
