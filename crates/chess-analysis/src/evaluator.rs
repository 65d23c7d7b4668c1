//! Interfaces to the external evaluators and helpers for talking to them.
//!
//! Both evaluators are asynchronous and paced independently. Readiness is
//! polled a bounded number of times; a tactical evaluation arrives as a
//! stream of bundles of non-decreasing depth that the caller may stop early.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chess_core::{EvaluationBundle, MaiaAnalysis, MaiaEvaluation, RatingBucket};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

/// Errors reported by evaluators and the helpers in this module.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    /// Failed to start or talk to an engine process.
    #[error("engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// Engine executable was not found at the specified path.
    #[error("engine not found at path: {0}")]
    NotFound(String),
    /// Engine did not complete the UCI handshake.
    #[error("engine initialization failed")]
    InitFailed,
    /// Engine returned an invalid or unexpected response.
    #[error("invalid engine response: {0}")]
    InvalidResponse(String),
    /// The evaluator did not become ready within the polling budget.
    #[error("evaluator not ready after {0} attempts")]
    NotReady(u32),
    /// The human-move model failed to load.
    #[error("move probability model unavailable")]
    ModelFailed,
    /// A batch answer did not match the request.
    #[error("batch returned {got} results for {expected} positions")]
    BatchMismatch { expected: usize, got: usize },
    /// The request was cancelled.
    #[error("evaluation cancelled")]
    Cancelled,
}

/// Readiness of the human-move model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStatus {
    Loading,
    Ready,
    Failed,
}

/// Bounded polling used while waiting for an evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Number of checks before giving up.
    pub attempts: u32,
    /// Pause between checks in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 100,
            interval_ms: 50,
        }
    }
}

/// Shared flag that stops long-running analysis.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receiving end of a tactical evaluation.
///
/// Dropping or closing the stream tells the producer to stop; evaluators
/// also expose [`TacticalEvaluator::stop_evaluation`].
#[derive(Debug)]
pub struct EvaluationStream {
    rx: mpsc::Receiver<EvaluationBundle>,
}

impl EvaluationStream {
    /// Creates a stream and the sender a producer task feeds.
    pub fn channel(buffer: usize) -> (mpsc::Sender<EvaluationBundle>, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// Next evaluation, or `None` once the producer has finished.
    pub async fn next(&mut self) -> Option<EvaluationBundle> {
        self.rx.recv().await
    }

    /// Stops accepting evaluations.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// A tactical engine producing evaluation bundles.
pub trait TacticalEvaluator: Send + Sync {
    /// Whether the engine can accept a request right now.
    fn is_ready(&self) -> bool;

    /// Starts evaluating `fen` with one line per legal move.
    ///
    /// Bundles arrive in non-decreasing depth order. With `target_depth`
    /// the stream ends once that depth is reached.
    fn stream_evaluations(
        &self,
        fen: &str,
        legal_move_count: usize,
        target_depth: Option<u32>,
    ) -> EvaluationStream;

    /// Cancels any evaluation in flight.
    fn stop_evaluation(&self);
}

/// A model predicting which moves humans of a given rating play.
pub trait MoveProbabilityModel: Send + Sync {
    fn status(&self) -> ModelStatus;

    /// Evaluates each `fens[i]` for a player rated `ratings_self[i]` facing
    /// `ratings_opponent[i]`. Returns one result per position, in order.
    fn batch_evaluate(
        &self,
        fens: &[String],
        ratings_self: &[u32],
        ratings_opponent: &[u32],
    ) -> impl Future<Output = Result<Vec<MaiaEvaluation>, EvaluatorError>> + Send;
}

/// Polls `check` until it succeeds or the attempts run out.
pub async fn wait_until_ready(mut check: impl FnMut() -> bool, poll: &PollConfig) -> bool {
    for attempt in 0..poll.attempts.max(1) {
        if check() {
            return true;
        }
        if attempt + 1 < poll.attempts {
            tokio::time::sleep(Duration::from_millis(poll.interval_ms)).await;
        }
    }
    false
}

/// Waits for the human-move model. A failed model is reported at once.
pub async fn wait_for_model<M: MoveProbabilityModel + ?Sized>(
    model: &M,
    poll: &PollConfig,
) -> Result<(), EvaluatorError> {
    let mut failed = false;
    let ready = wait_until_ready(
        || match model.status() {
            ModelStatus::Ready => true,
            ModelStatus::Failed => {
                failed = true;
                true
            }
            ModelStatus::Loading => false,
        },
        poll,
    )
    .await;
    if failed {
        return Err(EvaluatorError::ModelFailed);
    }
    if !ready {
        warn!(attempts = poll.attempts, "move probability model not ready");
        return Err(EvaluatorError::NotReady(poll.attempts));
    }
    Ok(())
}

/// Evaluates a position up to `depth` and returns the last bundle received
/// at or before that depth.
///
/// If the engine jumps past `depth` before reporting anything shallower, the
/// deeper bundle is returned instead. `Ok(None)` means the stream ended
/// without any evaluation.
pub async fn evaluate_at_depth<E: TacticalEvaluator + ?Sized>(
    evaluator: &E,
    fen: &str,
    legal_move_count: usize,
    depth: u32,
    poll: &PollConfig,
    cancel: &CancellationFlag,
) -> Result<Option<EvaluationBundle>, EvaluatorError> {
    if !wait_until_ready(|| evaluator.is_ready(), poll).await {
        warn!(fen, attempts = poll.attempts, "tactical evaluator not ready");
        return Err(EvaluatorError::NotReady(poll.attempts));
    }

    let mut stream = evaluator.stream_evaluations(fen, legal_move_count, Some(depth));
    let mut last: Option<EvaluationBundle> = None;
    while let Some(bundle) = stream.next().await {
        if cancel.is_cancelled() {
            stream.close();
            evaluator.stop_evaluation();
            return Err(EvaluatorError::Cancelled);
        }
        if bundle.depth > depth {
            last.get_or_insert(bundle);
            break;
        }
        let reached = bundle.depth == depth;
        last = Some(bundle);
        if reached {
            break;
        }
    }
    stream.close();
    evaluator.stop_evaluation();
    Ok(last)
}

/// Queries the model for one position at every rating bucket.
pub async fn evaluate_all_buckets<M: MoveProbabilityModel + ?Sized>(
    model: &M,
    fen: &str,
) -> Result<MaiaAnalysis, EvaluatorError> {
    let fens = vec![fen.to_string(); RatingBucket::ALL.len()];
    let ratings: Vec<u32> = RatingBucket::ALL.iter().map(|b| b.rating()).collect();
    let results = model.batch_evaluate(&fens, &ratings, &ratings).await?;
    if results.len() != fens.len() {
        return Err(EvaluatorError::BatchMismatch {
            expected: fens.len(),
            got: results.len(),
        });
    }
    Ok(RatingBucket::ALL.into_iter().zip(results).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::{Color, MoveValues};
    use std::sync::atomic::AtomicUsize;

    use crate::translate::translate;

    struct ScriptedEngine {
        ready_after: usize,
        polls: AtomicUsize,
        depths: Vec<u32>,
        stops: AtomicUsize,
    }

    impl ScriptedEngine {
        fn new(ready_after: usize, depths: Vec<u32>) -> Self {
            Self {
                ready_after,
                polls: AtomicUsize::new(0),
                depths,
                stops: AtomicUsize::new(0),
            }
        }
    }

    impl TacticalEvaluator for ScriptedEngine {
        fn is_ready(&self) -> bool {
            self.polls.fetch_add(1, Ordering::SeqCst) >= self.ready_after
        }

        fn stream_evaluations(&self, _: &str, _: usize, _: Option<u32>) -> EvaluationStream {
            let (tx, stream) = EvaluationStream::channel(self.depths.len());
            for depth in &self.depths {
                let raw: MoveValues = [("e2e4", *depth as f64)].into_iter().collect();
                tx.try_send(translate(&raw, Color::White, *depth).unwrap())
                    .unwrap();
            }
            stream
        }

        fn stop_evaluation(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_poll(attempts: u32) -> PollConfig {
        PollConfig {
            attempts,
            interval_ms: 1,
        }
    }

    #[tokio::test]
    async fn takes_the_requested_depth() {
        let engine = ScriptedEngine::new(0, vec![1, 2, 3, 4, 5]);
        let bundle = evaluate_at_depth(
            &engine,
            chess_core::STARTPOS,
            20,
            3,
            &fast_poll(1),
            &CancellationFlag::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(bundle.depth, 3);
        assert!(engine.stops.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn falls_back_to_last_shallower_depth() {
        let engine = ScriptedEngine::new(0, vec![1, 2, 4]);
        let bundle = evaluate_at_depth(
            &engine,
            chess_core::STARTPOS,
            20,
            3,
            &fast_poll(1),
            &CancellationFlag::new(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(bundle.depth, 2);
    }

    #[tokio::test]
    async fn waits_for_readiness_within_budget() {
        let engine = ScriptedEngine::new(3, vec![1]);
        let cancel = CancellationFlag::new();
        let result =
            evaluate_at_depth(&engine, chess_core::STARTPOS, 20, 1, &fast_poll(5), &cancel).await;
        assert!(matches!(result, Ok(Some(_))));

        let slow = ScriptedEngine::new(10, vec![1]);
        let result =
            evaluate_at_depth(&slow, chess_core::STARTPOS, 20, 1, &fast_poll(5), &cancel).await;
        assert!(matches!(result, Err(EvaluatorError::NotReady(5))));
    }

    #[tokio::test]
    async fn cancellation_discards_the_evaluation() {
        let engine = ScriptedEngine::new(0, vec![1, 2, 3]);
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result =
            evaluate_at_depth(&engine, chess_core::STARTPOS, 20, 3, &fast_poll(1), &cancel).await;
        assert!(matches!(result, Err(EvaluatorError::Cancelled)));
    }

    #[tokio::test]
    async fn wait_until_ready_gives_up() {
        let mut calls = 0;
        let ready = wait_until_ready(
            || {
                calls += 1;
                false
            },
            &fast_poll(4),
        )
        .await;
        assert!(!ready);
        assert_eq!(calls, 4);
    }
}
