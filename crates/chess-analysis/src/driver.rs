//! Writes evaluator output onto tree nodes.
//!
//! The tree is shared as `Arc<Mutex<GameTree>>`; the lock is taken only to
//! read a node's position and to write one analysis field, never across an
//! evaluator call. Results whose node no longer holds the evaluated position
//! are discarded.

use std::sync::Arc;

use chess_core::position::{self, PositionError};
use chess_core::{EvaluationBundle, MaiaAnalysis};
use chess_tree::{GameTree, NodeId, TreeError};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::evaluator::{
    evaluate_all_buckets, wait_for_model, wait_until_ready, CancellationFlag, EvaluatorError,
    MoveProbabilityModel, PollConfig, TacticalEvaluator,
};

/// Errors that stop node analysis.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Tree(#[from] TreeError),
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),
}

/// What became of a node analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// The field was written; for tactical analysis, up to this depth.
    Applied { depth: u32 },
    /// The evaluator was not ready within the polling budget.
    Skipped,
    /// A deeper evaluation was already stored.
    Unchanged,
    /// The node was removed or changed position while the evaluation ran.
    Stale,
    /// Checkmate or stalemate, nothing to evaluate.
    NoMoves,
}

/// Streams tactical evaluations of `node` up to `depth` into the tree.
///
/// Each bundle replaces the stored one unless the stored one is deeper. If the
/// node is removed while the evaluation runs, the result is dropped and the
/// outcome is [`AnalysisOutcome::Stale`].
pub async fn analyze_node_tactical<E: TacticalEvaluator + ?Sized>(
    tree: &Arc<Mutex<GameTree>>,
    node: NodeId,
    evaluator: &E,
    depth: u32,
    poll: &PollConfig,
    cancel: &CancellationFlag,
) -> Result<AnalysisOutcome, AnalysisError> {
    let fen = tree.lock().await.node(node)?.fen().to_string();
    let legal = position::legal_moves(&fen)?;
    if legal.is_empty() {
        return Ok(AnalysisOutcome::NoMoves);
    }

    if !wait_until_ready(|| evaluator.is_ready(), poll).await {
        warn!(fen = %fen, attempts = poll.attempts, "tactical evaluator not ready, skipping node");
        return Ok(AnalysisOutcome::Skipped);
    }

    let mut stream = evaluator.stream_evaluations(&fen, legal.len(), Some(depth));
    let mut reached = None;
    let written = |reached: Option<u32>| {
        reached.map_or(AnalysisOutcome::Unchanged, |depth| AnalysisOutcome::Applied {
            depth,
        })
    };
    let outcome = loop {
        let Some(bundle) = stream.next().await else {
            break Ok(written(reached));
        };
        if cancel.is_cancelled() {
            break Err(EvaluatorError::Cancelled.into());
        }

        let bundle_depth = bundle.depth;
        match store_bundle(tree, node, &fen, bundle).await? {
            Stored::Written => reached = Some(bundle_depth),
            Stored::Kept => {}
            Stored::Stale => break Ok(AnalysisOutcome::Stale),
        }
        if bundle_depth >= depth {
            break Ok(written(reached));
        }
    };

    stream.close();
    evaluator.stop_evaluation();
    outcome
}

enum Stored {
    Written,
    Kept,
    Stale,
}

async fn store_bundle(
    tree: &Mutex<GameTree>,
    node: NodeId,
    fen: &str,
    bundle: EvaluationBundle,
) -> Result<Stored, AnalysisError> {
    let mut tree = tree.lock().await;
    let Some(current) = tree.get(node).filter(|n| n.fen() == fen) else {
        warn!(?node, "discarding evaluation of a position the node no longer holds");
        return Ok(Stored::Stale);
    };
    if let Some(existing) = &current.analysis().stockfish {
        if existing.depth > bundle.depth {
            debug!(?node, existing = existing.depth, "keeping deeper evaluation");
            return Ok(Stored::Kept);
        }
    }
    tree.set_stockfish_analysis(node, bundle)?;
    Ok(Stored::Written)
}

/// Queries the human-move model for `node` at every rating bucket and
/// stores the whole map at once.
pub async fn analyze_node_human<M: MoveProbabilityModel + ?Sized>(
    tree: &Arc<Mutex<GameTree>>,
    node: NodeId,
    model: &M,
    poll: &PollConfig,
) -> Result<AnalysisOutcome, AnalysisError> {
    let fen = tree.lock().await.node(node)?.fen().to_string();
    if position::legal_moves(&fen)?.is_empty() {
        return Ok(AnalysisOutcome::NoMoves);
    }

    match wait_for_model(model, poll).await {
        Ok(()) => {}
        Err(EvaluatorError::NotReady(_)) => return Ok(AnalysisOutcome::Skipped),
        Err(e) => return Err(e.into()),
    }

    let maia: MaiaAnalysis = evaluate_all_buckets(model, &fen).await?;

    let mut tree = tree.lock().await;
    if tree.get(node).map_or(true, |n| n.fen() != fen) {
        warn!(?node, "discarding model output for a position the node no longer holds");
        return Ok(AnalysisOutcome::Stale);
    }
    tree.set_maia_analysis(node, maia)?;
    Ok(AnalysisOutcome::Applied { depth: 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chess_core::{Color, MaiaEvaluation, MoveValues, RatingBucket};

    use crate::evaluator::{EvaluationStream, ModelStatus};
    use crate::translate::translate;

    struct DepthEngine {
        depths: Vec<u32>,
        ready: AtomicBool,
    }

    impl DepthEngine {
        fn new(depths: Vec<u32>) -> Self {
            Self {
                depths,
                ready: AtomicBool::new(true),
            }
        }
    }

    impl TacticalEvaluator for DepthEngine {
        fn is_ready(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }

        fn stream_evaluations(&self, _: &str, _: usize, _: Option<u32>) -> EvaluationStream {
            let (tx, stream) = EvaluationStream::channel(self.depths.len());
            for &depth in &self.depths {
                let raw: MoveValues = [("e2e4", 20.0), ("d2d4", 10.0)].into_iter().collect();
                tx.try_send(translate(&raw, Color::White, depth).unwrap())
                    .unwrap();
            }
            stream
        }

        fn stop_evaluation(&self) {}
    }

    /// Removes the `d2d4` variation from the root as soon as it is asked to
    /// evaluate anything.
    struct PruningEngine {
        tree: Arc<Mutex<GameTree>>,
        inner: DepthEngine,
    }

    impl TacticalEvaluator for PruningEngine {
        fn is_ready(&self) -> bool {
            true
        }

        fn stream_evaluations(
            &self,
            fen: &str,
            moves: usize,
            depth: Option<u32>,
        ) -> EvaluationStream {
            self.tree
                .try_lock()
                .unwrap()
                .remove_variation(NodeId::ROOT, "d2d4")
                .unwrap();
            self.inner.stream_evaluations(fen, moves, depth)
        }

        fn stop_evaluation(&self) {}
    }

    struct PruningModel {
        tree: Arc<Mutex<GameTree>>,
    }

    impl MoveProbabilityModel for PruningModel {
        fn status(&self) -> ModelStatus {
            ModelStatus::Ready
        }

        async fn batch_evaluate(
            &self,
            fens: &[String],
            ratings_self: &[u32],
            ratings_opponent: &[u32],
        ) -> Result<Vec<MaiaEvaluation>, EvaluatorError> {
            self.tree
                .lock()
                .await
                .remove_variation(NodeId::ROOT, "d2d4")
                .unwrap();
            FlatModel
                .batch_evaluate(fens, ratings_self, ratings_opponent)
                .await
        }
    }

    struct FlatModel;

    impl MoveProbabilityModel for FlatModel {
        fn status(&self) -> ModelStatus {
            ModelStatus::Ready
        }

        async fn batch_evaluate(
            &self,
            fens: &[String],
            _: &[u32],
            _: &[u32],
        ) -> Result<Vec<MaiaEvaluation>, EvaluatorError> {
            Ok(fens
                .iter()
                .map(|_| MaiaEvaluation {
                    policy: [("e2e4", 0.6), ("d2d4", 0.4)].into_iter().collect(),
                    value: 0.5,
                })
                .collect())
        }
    }

    fn poll() -> PollConfig {
        PollConfig {
            attempts: 2,
            interval_ms: 1,
        }
    }

    fn shared_tree() -> Arc<Mutex<GameTree>> {
        Arc::new(Mutex::new(GameTree::default()))
    }

    #[tokio::test]
    async fn writes_deepest_bundle() {
        let tree = shared_tree();
        let engine = DepthEngine::new(vec![1, 2, 3]);
        let outcome = analyze_node_tactical(
            &tree,
            NodeId::ROOT,
            &engine,
            3,
            &poll(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, AnalysisOutcome::Applied { depth: 3 });
        let tree = tree.lock().await;
        let stored = tree.node(NodeId::ROOT).unwrap().analysis().stockfish.as_ref();
        assert_eq!(stored.unwrap().depth, 3);
    }

    #[tokio::test]
    async fn never_replaces_a_deeper_evaluation() {
        let tree = shared_tree();
        let cancel = CancellationFlag::new();
        let deep = DepthEngine::new(vec![10]);
        analyze_node_tactical(&tree, NodeId::ROOT, &deep, 10, &poll(), &cancel)
            .await
            .unwrap();

        let shallow = DepthEngine::new(vec![2]);
        let outcome = analyze_node_tactical(&tree, NodeId::ROOT, &shallow, 2, &poll(), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, AnalysisOutcome::Unchanged);

        let tree = tree.lock().await;
        let stored = tree.node(NodeId::ROOT).unwrap().analysis().stockfish.as_ref();
        assert_eq!(stored.unwrap().depth, 10);
    }

    #[tokio::test]
    async fn unready_engine_is_skipped() {
        let tree = shared_tree();
        let engine = DepthEngine::new(vec![1]);
        engine.ready.store(false, Ordering::SeqCst);
        let outcome = analyze_node_tactical(
            &tree,
            NodeId::ROOT,
            &engine,
            1,
            &poll(),
            &CancellationFlag::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, AnalysisOutcome::Skipped);
        assert!(tree.lock().await.node(NodeId::ROOT).unwrap().analysis().stockfish.is_none());
    }

    #[tokio::test]
    async fn cancelled_analysis_writes_nothing() {
        let tree = shared_tree();
        let engine = DepthEngine::new(vec![1, 2]);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result = analyze_node_tactical(&tree, NodeId::ROOT, &engine, 2, &poll(), &cancel).await;
        assert!(matches!(
            result,
            Err(AnalysisError::Evaluator(EvaluatorError::Cancelled))
        ));
        assert!(tree.lock().await.node(NodeId::ROOT).unwrap().analysis().stockfish.is_none());
    }

    #[tokio::test]
    async fn human_analysis_fills_every_bucket() {
        let tree = shared_tree();
        let outcome = analyze_node_human(&tree, NodeId::ROOT, &FlatModel, &poll())
            .await
            .unwrap();
        assert_eq!(outcome, AnalysisOutcome::Applied { depth: 0 });

        let tree = tree.lock().await;
        let maia = tree.node(NodeId::ROOT).unwrap().analysis().maia.clone().unwrap();
        assert_eq!(maia.len(), RatingBucket::ALL.len());
        assert_eq!(maia[&RatingBucket::R1500].policy.get("e2e4"), Some(0.6));
    }

    fn tree_with_variation() -> (Arc<Mutex<GameTree>>, NodeId) {
        let mut tree = GameTree::default();
        tree.play_main_move(NodeId::ROOT, "e2e4").unwrap();
        let d4 = tree.play_variation(NodeId::ROOT, "d2d4").unwrap();
        (Arc::new(Mutex::new(tree)), d4)
    }

    #[tokio::test]
    async fn evaluation_of_a_removed_node_is_discarded() {
        let (tree, d4) = tree_with_variation();
        let engine = PruningEngine {
            tree: Arc::clone(&tree),
            inner: DepthEngine::new(vec![1, 2]),
        };

        let cancel = CancellationFlag::new();
        let outcome = analyze_node_tactical(&tree, d4, &engine, 2, &poll(), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome, AnalysisOutcome::Stale);
        let tree = tree.lock().await;
        assert!(tree.get(d4).is_none());
        assert_eq!(tree.node(NodeId::ROOT).unwrap().children().len(), 1);
    }

    #[tokio::test]
    async fn model_output_for_a_removed_node_is_discarded() {
        let (tree, d4) = tree_with_variation();
        let model = PruningModel {
            tree: Arc::clone(&tree),
        };

        let outcome = analyze_node_human(&tree, d4, &model, &poll()).await.unwrap();

        assert_eq!(outcome, AnalysisOutcome::Stale);
        assert!(tree.lock().await.get(d4).is_none());
    }

    #[tokio::test]
    async fn mated_position_needs_no_analysis() {
        let tree = Arc::new(Mutex::new(
            GameTree::from_san_moves(chess_core::STARTPOS, &["f3", "e5", "g4", "Qh4#"]).unwrap(),
        ));
        let last = tree.lock().await.node_at_ply(4).unwrap();
        let outcome = analyze_node_human(&tree, last, &FlatModel, &poll()).await.unwrap();
        assert_eq!(outcome, AnalysisOutcome::NoMoves);
    }
}
