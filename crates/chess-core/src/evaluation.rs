//! Tactical evaluation types.

use serde::{Deserialize, Serialize};

use crate::values::MoveValues;

/// Centipawn value used for a forced mate. Mate distances are subtracted so
/// that shorter mates score higher.
pub const MATE_CP: i32 = 10_000;

/// Represents a chess position evaluation.
///
/// Evaluations can be either centipawn scores (for normal positions)
/// or mate scores (when a forced mate is found). Both are from the side to
/// move's point of view, as UCI engines report them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Evaluation {
    /// Centipawn evaluation.
    Centipawns(i32),
    /// Mate in N moves (positive = side to move mates, negative = gets mated).
    Mate(i32),
}

impl Evaluation {
    /// Builds an evaluation from the `score cp`/`score mate` fields of a UCI
    /// info line. A mate score wins over a centipawn score.
    pub fn from_uci_score(cp: Option<i32>, mate: Option<i32>) -> Option<Self> {
        match (cp, mate) {
            (_, Some(m)) => Some(Evaluation::Mate(m)),
            (Some(c), None) => Some(Evaluation::Centipawns(c)),
            (None, None) => None,
        }
    }

    /// Collapses the evaluation onto the centipawn scale.
    ///
    /// `Mate(0)` means the side to move is already mated.
    pub fn to_centipawns(self) -> i32 {
        match self {
            Evaluation::Centipawns(cp) => cp,
            Evaluation::Mate(m) if m > 0 => MATE_CP - m,
            Evaluation::Mate(m) => -MATE_CP - m,
        }
    }

    /// The same evaluation seen from the other side.
    pub fn flip(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(-cp),
            Evaluation::Mate(m) => Evaluation::Mate(-m),
        }
    }
}

/// Normalized tactical evaluation of one position at one depth.
///
/// All four vectors carry the same moves in the same order, best move for
/// the side to move first. `cp_vec` and `model_optimal_cp` are stated from
/// White's point of view; `cp_relative_vec`, `winrate_vec` and
/// `winrate_loss_vec` are stated from the side to move's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationBundle {
    pub depth: u32,
    pub model_move: String,
    pub model_optimal_cp: f64,
    pub cp_vec: MoveValues,
    pub cp_relative_vec: MoveValues,
    pub winrate_vec: MoveValues,
    pub winrate_loss_vec: MoveValues,
}

impl EvaluationBundle {
    /// Win-rate of the best move for the side to move.
    pub fn best_winrate(&self) -> Option<f64> {
        self.winrate_vec.get(&self.model_move)
    }

    /// Number of moves covered.
    pub fn move_count(&self) -> usize {
        self.cp_vec.len()
    }
}
