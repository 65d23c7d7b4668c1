//! Move quality classification.
//!
//! Combines the tactical evaluation of a position with the human-move model
//! to label a candidate move.

use chess_core::{EvaluationBundle, MaiaEvaluation, MoveValues, RatingBucket};
use chess_tree::GameNode;
use serde::{Deserialize, Serialize};

/// Thresholds for move classification. Win-rate values are fractions (0.10
/// means ten percentage points).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Win-rate loss against the best move that makes a blunder.
    pub blunder_threshold: f64,
    /// Win-rate loss against the best move that makes an inaccuracy.
    pub inaccuracy_threshold: f64,
    /// A move must be less likely than this for humans to be excellent.
    pub excellent_max_probability: f64,
    /// Margin over the expected human win-rate an excellent move must beat.
    pub excellent_margin: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            blunder_threshold: 0.10,
            inaccuracy_threshold: 0.05,
            excellent_max_probability: 0.10,
            excellent_margin: 0.10,
        }
    }
}

/// Verdict for one candidate move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveClassification {
    pub blunder: bool,
    pub inaccuracy: bool,
    pub excellent: bool,
    pub best_move: bool,
}

/// Single label summarizing a [`MoveClassification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveQuality {
    /// The engine's choice
    Best,
    /// Strong and hard for humans to find
    Excellent,
    /// Neither notably strong nor weak
    Good,
    /// Moderate win-rate loss
    Inaccuracy,
    /// Large win-rate loss
    Blunder,
}

impl MoveClassification {
    pub fn quality(&self) -> MoveQuality {
        if self.best_move {
            MoveQuality::Best
        } else if self.blunder {
            MoveQuality::Blunder
        } else if self.inaccuracy {
            MoveQuality::Inaccuracy
        } else if self.excellent {
            MoveQuality::Excellent
        } else {
            MoveQuality::Good
        }
    }

    pub fn is_mistake(&self) -> bool {
        self.blunder || self.inaccuracy
    }
}

/// Average win-rate a human would reach, weighting each move by its policy
/// probability. Only moves present in both inputs count, and their weights
/// are renormalized. `None` when no weight is left.
pub fn weighted_average_winrate(policy: &MoveValues, winrates: &MoveValues) -> Option<f64> {
    let (weight, sum) = policy
        .iter()
        .filter_map(|(mv, p)| winrates.get(mv).map(|w| (p, w)))
        .fold((0.0, 0.0), |(weight, sum), (p, w)| (weight + p, sum + p * w));
    (weight > 0.0).then(|| sum / weight)
}

/// Classifies `mv` in a position given its tactical evaluation and,
/// optionally, the human-move model output for one rating bucket.
///
/// Without model output a move is never excellent.
pub fn classify_move(
    stockfish: &EvaluationBundle,
    maia: Option<&MaiaEvaluation>,
    mv: &str,
    config: &ClassifierConfig,
) -> MoveClassification {
    let best_move = stockfish.model_move == mv;

    let loss = stockfish.winrate_loss_vec.get(mv).map(|l| -l).unwrap_or(0.0);
    let blunder = !best_move && loss >= config.blunder_threshold;
    let inaccuracy = !best_move && !blunder && loss >= config.inaccuracy_threshold;

    let excellent = match (maia, stockfish.winrate_vec.get(mv)) {
        (Some(maia), Some(winrate)) => {
            let probability = maia.policy.get(mv).unwrap_or(0.0);
            probability < config.excellent_max_probability
                && weighted_average_winrate(&maia.policy, &stockfish.winrate_vec)
                    .is_some_and(|avg| winrate - avg > config.excellent_margin)
        }
        _ => false,
    };

    MoveClassification {
        blunder,
        inaccuracy,
        excellent,
        best_move,
    }
}

/// Classifies a move from `node` using the analysis stored on it.
///
/// Returns `None` until the node has a tactical evaluation.
pub fn classify_node_move(
    node: &GameNode,
    bucket: RatingBucket,
    mv: &str,
    config: &ClassifierConfig,
) -> Option<MoveClassification> {
    let analysis = node.analysis();
    let stockfish = analysis.stockfish.as_ref()?;
    let maia = analysis.maia.as_ref().and_then(|m| m.get(&bucket));
    Some(classify_move(stockfish, maia, mv, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, f64)]) -> MoveValues {
        pairs.iter().copied().collect()
    }

    fn bundle(winrates: &[(&str, f64)]) -> EvaluationBundle {
        let winrate_vec = values(winrates);
        let best = winrate_vec.max_value().unwrap();
        let model_move = winrate_vec
            .iter()
            .find(|(_, w)| *w == best)
            .map(|(m, _)| m.to_string())
            .unwrap();
        EvaluationBundle {
            depth: 18,
            model_move,
            model_optimal_cp: 0.0,
            cp_vec: winrate_vec.map_values(|_| 0.0),
            cp_relative_vec: winrate_vec.map_values(|_| 0.0),
            winrate_loss_vec: winrate_vec.map_values(|w| w - best),
            winrate_vec,
        }
    }

    fn maia(policy: &[(&str, f64)]) -> MaiaEvaluation {
        MaiaEvaluation {
            policy: values(policy),
            value: 0.5,
        }
    }

    #[test]
    fn weighted_average_renormalizes() {
        let policy = values(&[("A", 0.5), ("B", 0.3), ("C", 0.05)]);
        let winrates = values(&[("A", 0.6), ("B", 0.58), ("C", 0.4)]);
        let avg = weighted_average_winrate(&policy, &winrates).unwrap();
        assert!((avg - 0.581_176).abs() < 1e-4);
    }

    #[test]
    fn unlikely_but_not_better_is_not_excellent() {
        let sf = bundle(&[("A", 0.6), ("B", 0.58), ("C", 0.4)]);
        let human = maia(&[("A", 0.5), ("B", 0.3), ("C", 0.05)]);
        let verdict = classify_move(&sf, Some(&human), "C", &ClassifierConfig::default());
        assert!(!verdict.excellent);
    }

    #[test]
    fn unlikely_and_much_better_is_excellent() {
        let sf = bundle(&[("A", 0.6), ("B", 0.45), ("C", 0.7)]);
        let human = maia(&[("A", 0.6), ("B", 0.35), ("C", 0.05)]);
        let avg = weighted_average_winrate(&human.policy, &sf.winrate_vec).unwrap();
        assert!((avg - 0.5525).abs() < 1e-9);

        let verdict = classify_move(&sf, Some(&human), "C", &ClassifierConfig::default());
        assert!(verdict.excellent);
        assert!(verdict.best_move);
        assert_eq!(verdict.quality(), MoveQuality::Best);
    }

    #[test]
    fn obvious_moves_are_never_excellent() {
        let sf = bundle(&[("A", 0.9), ("B", 0.3)]);
        let human = maia(&[("A", 0.4), ("B", 0.6)]);
        let verdict = classify_move(&sf, Some(&human), "A", &ClassifierConfig::default());
        assert!(!verdict.excellent);
    }

    #[test]
    fn loss_tiers() {
        let sf = bundle(&[("A", 0.60), ("B", 0.53), ("C", 0.45), ("D", 0.58)]);
        let config = ClassifierConfig::default();

        let b = classify_move(&sf, None, "B", &config);
        assert!(b.inaccuracy && !b.blunder);
        assert_eq!(b.quality(), MoveQuality::Inaccuracy);

        let c = classify_move(&sf, None, "C", &config);
        assert!(c.blunder && !c.inaccuracy);
        assert!(c.is_mistake());

        let d = classify_move(&sf, None, "D", &config);
        assert!(!d.is_mistake());
        assert_eq!(d.quality(), MoveQuality::Good);

        let a = classify_move(&sf, None, "A", &config);
        assert!(a.best_move && !a.is_mistake());
    }

    #[test]
    fn thresholds_are_configurable() {
        let sf = bundle(&[("A", 0.60), ("B", 0.53)]);
        let strict = ClassifierConfig {
            blunder_threshold: 0.05,
            ..ClassifierConfig::default()
        };
        assert!(classify_move(&sf, None, "B", &strict).blunder);
    }

    #[test]
    fn unknown_move_is_unclassified() {
        let sf = bundle(&[("A", 0.60)]);
        let verdict = classify_move(&sf, None, "Z", &ClassifierConfig::default());
        assert_eq!(verdict, MoveClassification::default());
    }
}
