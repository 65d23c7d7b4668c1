//! Raw engine scores to normalized evaluation bundles.

use chess_core::{Color, EvaluationBundle, MoveValues};
use tracing::warn;

use crate::winrate::cp_to_winrate;

/// Builds an [`EvaluationBundle`] from per-move centipawn scores.
///
/// `raw` holds one score per move from the point of view of `turn`, the
/// side to move. The best move comes first in every vector; ties are broken
/// by move text so the result does not depend on input order. With Black to
/// move only `cp_vec` and `model_optimal_cp` are negated (White's point of
/// view); relative and win-rate vectors stay with the side to move.
///
/// NaN scores are dropped. Returns `None` when no score is left.
pub fn translate(raw: &MoveValues, turn: Color, depth: u32) -> Option<EvaluationBundle> {
    let mut entries: Vec<(&str, f64)> = raw.iter().filter(|(_, v)| !v.is_nan()).collect();
    if entries.len() < raw.len() {
        warn!(
            dropped = raw.len() - entries.len(),
            depth, "non-numeric engine scores ignored"
        );
    }
    if entries.is_empty() {
        return None;
    }

    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    let sorted: MoveValues = entries.into_iter().collect();

    let (model_move, best_cp) = sorted.first().map(|(m, v)| (m.to_string(), v))?;

    let cp_relative_vec = sorted.map_values(|cp| cp - best_cp);
    let winrate_vec = sorted.map_values(|cp| cp_to_winrate(cp, false));
    let best_winrate = winrate_vec.max_value().unwrap_or(0.5);
    let winrate_loss_vec = winrate_vec.map_values(|w| w - best_winrate);

    let (cp_vec, model_optimal_cp) = match turn {
        Color::White => (sorted, best_cp),
        Color::Black => (sorted.map_values(white_view), white_view(best_cp)),
    };

    Some(EvaluationBundle {
        depth,
        model_move,
        model_optimal_cp,
        cp_vec,
        cp_relative_vec,
        winrate_vec,
        winrate_loss_vec,
    })
}

fn white_view(cp: f64) -> f64 {
    // Adding 0.0 turns -0.0 into 0.0.
    -cp + 0.0
}
