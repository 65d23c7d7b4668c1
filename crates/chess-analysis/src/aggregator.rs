//! Expected outcome of candidate moves against likely human replies.
//!
//! For every candidate move the aggregator grows a tree of the replies a
//! player of the chosen rating is likely to play, keeping only paths whose
//! cumulative probability stays above a threshold. The leaves are evaluated
//! by the tactical engine and folded back into one expected win-rate for the
//! player making the candidate move.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chess_core::position::{self, PositionError, Terminal};
use chess_core::{Color, MoveValues, RatingBucket};
use chess_tree::{GameTree, NodeId, TreeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::book::{merge_policy, OpeningBook};
use crate::evaluator::{
    evaluate_at_depth, wait_for_model, CancellationFlag, EvaluatorError, MoveProbabilityModel,
    PollConfig, TacticalEvaluator,
};

/// Errors that end an aggregation run. No partial result is returned.
#[derive(Debug, Error)]
pub enum AggregatorError {
    #[error("analysis cancelled")]
    Cancelled,
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error("no legal moves in {0}")]
    NoLegalMoves(String),
    #[error("no tactical evaluation for base position {0}")]
    BaseEvaluationUnavailable(String),
    #[error("move probability model unavailable: {0}")]
    ModelUnavailable(EvaluatorError),
    #[error(transparent)]
    Evaluator(EvaluatorError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Tree(#[from] TreeError),
}

impl From<EvaluatorError> for AggregatorError {
    fn from(e: EvaluatorError) -> Self {
        match e {
            EvaluatorError::Cancelled => AggregatorError::Cancelled,
            other => AggregatorError::Evaluator(other),
        }
    }
}

/// Settings of one aggregation run. Every field is part of the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpectedWinrateParams {
    /// Branches whose cumulative probability falls below this are pruned.
    pub probability_threshold: f64,
    /// Target depth for every tactical evaluation.
    pub depth: u32,
    /// Candidates whose one-ply win-rate is below this are not expanded.
    pub min_winrate: f64,
    /// Identity of the human-move model.
    pub maia_model: String,
    /// Rating the human replies are predicted for.
    pub rating: RatingBucket,
    /// Expansion stops this many plies after the base position.
    pub max_ply: u32,
    /// The opening book is consulted for positions up to this many plies
    /// after the base position.
    pub book_max_ply: u32,
}

impl Default for ExpectedWinrateParams {
    fn default() -> Self {
        Self {
            probability_threshold: 0.05,
            depth: 12,
            min_winrate: 0.0,
            maia_model: "maia2".to_string(),
            rating: RatingBucket::R1500,
            max_ply: 4,
            book_max_ply: 2,
        }
    }
}

impl ExpectedWinrateParams {
    fn validate(&self) -> Result<(), AggregatorError> {
        if self.probability_threshold <= 0.0 || !(0.0..=1.0).contains(&self.probability_threshold) {
            return Err(AggregatorError::InvalidParams(format!(
                "probability_threshold must be in (0, 1], got {}",
                self.probability_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_winrate) {
            return Err(AggregatorError::InvalidParams(format!(
                "min_winrate must be in [0, 1], got {}",
                self.min_winrate
            )));
        }
        if self.depth == 0 || self.max_ply == 0 {
            return Err(AggregatorError::InvalidParams(
                "depth and max_ply must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fen: String,
    probability_threshold: u64,
    depth: u32,
    min_winrate: u64,
    maia_model: String,
    rating: RatingBucket,
    max_ply: u32,
    book_max_ply: u32,
}

impl CacheKey {
    fn new(fen: &str, params: &ExpectedWinrateParams) -> Self {
        Self {
            fen: fen.to_string(),
            probability_threshold: params.probability_threshold.to_bits(),
            depth: params.depth,
            min_winrate: params.min_winrate.to_bits(),
            maia_model: params.maia_model.clone(),
            rating: params.rating,
            max_ply: params.max_ply,
            book_max_ply: params.book_max_ply,
        }
    }
}

/// Evaluation of one leaf of an expansion tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafEvaluation {
    /// Win-rate for the player who made the candidate move.
    pub winrate: f64,
    pub depth: u32,
    /// Checkmate or draw, scored without the engine.
    pub terminal: bool,
}

/// A position reached while expanding a candidate move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionNode {
    pub fen: String,
    /// Move that reached the position; the candidate move at the root.
    pub mv: String,
    pub san: String,
    /// Plies after the base position (the root is ply 1).
    pub ply: u32,
    /// Probability of the whole path from the candidate to this position.
    pub probability: f64,
    /// Indices of children in [`ExpansionTree::nodes`].
    pub children: Vec<usize>,
    /// Set on evaluated leaves.
    pub leaf: Option<LeafEvaluation>,
}

impl ExpansionNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// Flat reply tree of one candidate; the root is at index 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpansionTree {
    pub nodes: Vec<ExpansionNode>,
}

impl ExpansionTree {
    pub fn root(&self) -> Option<&ExpansionNode> {
        self.nodes.first()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &ExpansionNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }
}

/// Expected outcome of one candidate move.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub mv: String,
    pub san: String,
    /// Win-rate of the move in the base evaluation, if it had one.
    pub one_ply_winrate: Option<f64>,
    pub expected_winrate: f64,
    /// Share of the reply probability mass that was evaluated.
    pub coverage: f64,
    pub confidence: f64,
    pub average_depth: f64,
    pub leaf_count: usize,
    pub tree: ExpansionTree,
}

/// Outcome of an aggregation run, candidates best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedWinrateResult {
    pub base_fen: String,
    /// Best win-rate for the side to move in the base position.
    pub base_winrate: f64,
    pub params: ExpectedWinrateParams,
    pub moves: Vec<MoveOutcome>,
    /// Mean coverage over the expanded candidates.
    pub coverage: f64,
    pub elapsed: Duration,
    pub cache_hit: bool,
}

impl ExpectedWinrateResult {
    pub fn best(&self) -> Option<&MoveOutcome> {
        self.moves.first()
    }
}

/// Number of results an [`Aggregator`] keeps unless configured otherwise.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Completed results, evicted oldest first once `capacity` is reached.
struct ResultCache {
    entries: HashMap<CacheKey, ExpectedWinrateResult>,
    order: VecDeque<CacheKey>,
    capacity: usize,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<&ExpectedWinrateResult> {
        self.entries.get(key)
    }

    fn insert(&mut self, key: CacheKey, result: ExpectedWinrateResult) {
        if self.entries.insert(key.clone(), result).is_some() {
            return;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                debug!(fen = %oldest.fen, "evicted expected win-rate result");
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Runs expected-outcome analysis against a tactical engine and a
/// human-move model, caching complete results.
///
/// The cache holds at most [`DEFAULT_CACHE_CAPACITY`] results (see
/// [`Aggregator::with_cache_capacity`]); the oldest result is dropped first.
pub struct Aggregator<E, M> {
    tactical: E,
    model: M,
    book: Option<Box<dyn OpeningBook>>,
    poll: PollConfig,
    cache: Mutex<ResultCache>,
}

impl<E, M> Aggregator<E, M>
where
    E: TacticalEvaluator,
    M: MoveProbabilityModel,
{
    pub fn new(tactical: E, model: M) -> Self {
        Self {
            tactical,
            model,
            book: None,
            poll: PollConfig::default(),
            cache: Mutex::new(ResultCache::new(DEFAULT_CACHE_CAPACITY)),
        }
    }

    /// Keeps at most `capacity` results; zero is treated as one.
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache = Mutex::new(ResultCache::new(capacity));
        self
    }

    /// Uses book frequencies where the book covers a position within
    /// [`ExpectedWinrateParams::book_max_ply`].
    pub fn with_book(mut self, book: impl OpeningBook + 'static) -> Self {
        self.book = Some(Box::new(book));
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn tactical(&self) -> &E {
        &self.tactical
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Drops every cached result.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cached_results(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Analyzes the position of a tree node.
    pub async fn analyze_node(
        &self,
        tree: &GameTree,
        node: NodeId,
        params: &ExpectedWinrateParams,
        cancel: &CancellationFlag,
    ) -> Result<ExpectedWinrateResult, AggregatorError> {
        let fen = tree.node(node)?.fen().to_string();
        self.analyze(&fen, params, cancel).await
    }

    /// Ranks every legal move of `fen` by expected win-rate.
    ///
    /// `cancel` is checked between candidates, expansion levels and leaf
    /// evaluations.
    pub async fn analyze(
        &self,
        fen: &str,
        params: &ExpectedWinrateParams,
        cancel: &CancellationFlag,
    ) -> Result<ExpectedWinrateResult, AggregatorError> {
        let started = Instant::now();
        params.validate()?;

        let key = CacheKey::new(fen, params);
        if let Some(mut hit) = self.cached(&key) {
            debug!(fen, "expected win-rate cache hit");
            hit.cache_hit = true;
            hit.elapsed = started.elapsed();
            return Ok(hit);
        }

        let legal = position::legal_moves(fen)?;
        if legal.is_empty() {
            return Err(AggregatorError::NoLegalMoves(fen.to_string()));
        }
        let mover = position::side_to_move(fen)?;

        let base = evaluate_at_depth(
            &self.tactical,
            fen,
            legal.len(),
            params.depth,
            &self.poll,
            cancel,
        )
        .await?
        .ok_or_else(|| AggregatorError::BaseEvaluationUnavailable(fen.to_string()))?;
        let base_winrate = base.best_winrate().unwrap_or(0.5);

        wait_for_model(&self.model, &self.poll)
            .await
            .map_err(AggregatorError::ModelUnavailable)?;

        // Engine order first, then legal moves the engine did not score.
        let mut candidates: Vec<&str> = base
            .winrate_vec
            .moves()
            .filter(|m| legal.iter().any(|l| l == m))
            .collect();
        candidates.extend(
            legal
                .iter()
                .map(String::as_str)
                .filter(|m| !base.winrate_vec.contains(m)),
        );

        let mut moves = Vec::new();
        for mv in candidates {
            if cancel.is_cancelled() {
                return Err(AggregatorError::Cancelled);
            }
            let one_ply = base.winrate_vec.get(mv);
            if one_ply.is_some_and(|w| w < params.min_winrate) {
                debug!(mv, "candidate below minimum win-rate, skipped");
                continue;
            }
            moves.push(self.expand_candidate(fen, mv, mover, one_ply, params, cancel).await?);
        }

        moves.sort_by(|a, b| {
            b.expected_winrate
                .total_cmp(&a.expected_winrate)
                .then_with(|| a.mv.cmp(&b.mv))
        });
        let coverage = if moves.is_empty() {
            0.0
        } else {
            moves.iter().map(|m| m.coverage).sum::<f64>() / moves.len() as f64
        };

        let result = ExpectedWinrateResult {
            base_fen: fen.to_string(),
            base_winrate,
            params: params.clone(),
            moves,
            coverage,
            elapsed: started.elapsed(),
            cache_hit: false,
        };
        info!(
            fen,
            candidates = result.moves.len(),
            best = result.best().map(|m| m.mv.as_str()).unwrap_or("-"),
            elapsed_ms = result.elapsed.as_millis() as u64,
            "expected win-rate analysis complete"
        );

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, result.clone());
        }
        Ok(result)
    }

    fn cached(&self, key: &CacheKey) -> Option<ExpectedWinrateResult> {
        self.cache.lock().ok()?.get(key).cloned()
    }

    async fn expand_candidate(
        &self,
        base_fen: &str,
        mv: &str,
        mover: Color,
        one_ply_winrate: Option<f64>,
        params: &ExpectedWinrateParams,
        cancel: &CancellationFlag,
    ) -> Result<MoveOutcome, AggregatorError> {
        let played = position::apply_uci(base_fen, mv)?;
        let mut tree = ExpansionTree {
            nodes: vec![ExpansionNode {
                fen: played.fen,
                mv: played.uci,
                san: played.san.clone(),
                ply: 1,
                probability: 1.0,
                children: Vec::new(),
                leaf: None,
            }],
        };

        let mut frontier = vec![0];
        while !frontier.is_empty() {
            if cancel.is_cancelled() {
                return Err(AggregatorError::Cancelled);
            }
            frontier = self.expand_level(&mut tree, frontier, params).await?;
        }

        let leaves: Vec<usize> = (0..tree.nodes.len())
            .filter(|&i| tree.nodes[i].is_leaf())
            .collect();
        for index in leaves {
            if cancel.is_cancelled() {
                return Err(AggregatorError::Cancelled);
            }
            let leaf = self
                .evaluate_leaf(&tree.nodes[index].fen, mover, params, cancel)
                .await?;
            tree.nodes[index].leaf = leaf;
        }

        Ok(summarize(mv, played.san, one_ply_winrate, params, tree))
    }

    /// Expands the frontier by one ply and returns the new frontier.
    async fn expand_level(
        &self,
        tree: &mut ExpansionTree,
        frontier: Vec<usize>,
        params: &ExpectedWinrateParams,
    ) -> Result<Vec<usize>, AggregatorError> {
        let mut open = Vec::new();
        for index in frontier {
            let node = &tree.nodes[index];
            if node.ply >= params.max_ply {
                continue;
            }
            let pos = position::parse_position(&node.fen)?;
            if position::terminal_state(&pos).is_none() {
                open.push(index);
            }
        }
        if open.is_empty() {
            return Ok(Vec::new());
        }

        let fens: Vec<String> = open.iter().map(|&i| tree.nodes[i].fen.clone()).collect();
        let ratings = vec![params.rating.rating(); fens.len()];
        let answers = self.model.batch_evaluate(&fens, &ratings, &ratings).await?;
        if answers.len() != fens.len() {
            return Err(EvaluatorError::BatchMismatch {
                expected: fens.len(),
                got: answers.len(),
            }
            .into());
        }

        let mut next = Vec::new();
        for (index, answer) in open.into_iter().zip(answers) {
            let (parent_probability, ply, fen) = {
                let node = &tree.nodes[index];
                (node.probability, node.ply, node.fen.clone())
            };
            let policy = if ply <= params.book_max_ply {
                self.policy_for(&fen, answer.policy, params.rating)
            } else {
                answer.policy
            };

            for (reply, p) in policy.iter() {
                let probability = parent_probability * p;
                if probability.is_nan() || probability < params.probability_threshold {
                    continue;
                }
                let Ok(played) = position::apply_uci(&fen, reply) else {
                    debug!(reply, fen = %fen, "model proposed an illegal move");
                    continue;
                };
                let child = tree.nodes.len();
                tree.nodes.push(ExpansionNode {
                    fen: played.fen,
                    mv: played.uci,
                    san: played.san,
                    ply: ply + 1,
                    probability,
                    children: Vec::new(),
                    leaf: None,
                });
                tree.nodes[index].children.push(child);
                next.push(child);
            }
        }
        Ok(next)
    }

    fn policy_for(&self, fen: &str, inferred: MoveValues, bucket: RatingBucket) -> MoveValues {
        match self.book.as_ref().and_then(|book| book.lookup(fen, bucket)) {
            Some(book) => merge_policy(&inferred, &book),
            None => inferred,
        }
    }

    /// Scores a leaf for `mover`. `None` when the engine gave no answer.
    async fn evaluate_leaf(
        &self,
        fen: &str,
        mover: Color,
        params: &ExpectedWinrateParams,
        cancel: &CancellationFlag,
    ) -> Result<Option<LeafEvaluation>, AggregatorError> {
        let pos = position::parse_position(fen)?;
        let to_move = position::side_to_move(fen)?;
        if let Some(terminal) = position::terminal_state(&pos) {
            let winrate = match terminal {
                Terminal::Draw => 0.5,
                Terminal::Checkmate if to_move == mover => 0.0,
                Terminal::Checkmate => 1.0,
            };
            return Ok(Some(LeafEvaluation {
                winrate,
                depth: params.depth,
                terminal: true,
            }));
        }

        let legal = position::legal_moves(fen)?.len();
        let evaluation =
            evaluate_at_depth(&self.tactical, fen, legal, params.depth, &self.poll, cancel).await;
        let bundle = match evaluation {
            Ok(bundle) => bundle,
            Err(EvaluatorError::Cancelled) => return Err(AggregatorError::Cancelled),
            Err(e) => {
                warn!(fen, error = %e, "leaf not evaluated");
                None
            }
        };
        Ok(bundle.and_then(|b| {
            let best = b.best_winrate()?;
            let winrate = if to_move == mover { best } else { 1.0 - best };
            Some(LeafEvaluation {
                winrate: winrate.clamp(0.0, 1.0),
                depth: b.depth,
                terminal: false,
            })
        }))
    }
}

/// Folds evaluated leaves into the candidate's outcome.
fn summarize(
    mv: &str,
    san: String,
    one_ply_winrate: Option<f64>,
    params: &ExpectedWinrateParams,
    tree: ExpansionTree,
) -> MoveOutcome {
    let evaluated: Vec<(f64, &LeafEvaluation)> = tree
        .leaves()
        .filter_map(|n| n.leaf.as_ref().map(|leaf| (n.probability, leaf)))
        .collect();

    let mass: f64 = evaluated.iter().map(|(p, _)| p).sum();
    let expected_winrate = if mass > 0.0 {
        evaluated.iter().map(|(p, leaf)| p * leaf.winrate).sum::<f64>() / mass
    } else {
        one_ply_winrate.unwrap_or(0.5)
    };
    let average_depth = if evaluated.is_empty() {
        0.0
    } else {
        evaluated
            .iter()
            .map(|(_, leaf)| f64::from(leaf.depth))
            .sum::<f64>()
            / evaluated.len() as f64
    };

    let coverage = mass.clamp(0.0, 1.0);
    let depth_ratio = (average_depth / f64::from(params.depth)).min(1.0);
    MoveOutcome {
        mv: mv.to_string(),
        san,
        one_ply_winrate,
        expected_winrate: expected_winrate.clamp(0.0, 1.0),
        coverage,
        confidence: (coverage * depth_ratio).clamp(0.0, 1.0),
        average_depth,
        leaf_count: evaluated.len(),
        tree,
    }
}
