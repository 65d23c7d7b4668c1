//! Mistake scan over a game's mainline.

use chess_core::position;
use chess_core::Color;
use chess_tree::{GameTree, TreeError};
use serde::{Deserialize, Serialize};

use crate::classify::{classify_move, ClassifierConfig, MoveQuality};

/// A mainline move classified as a blunder or an inaccuracy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MistakePosition {
    /// Zero-based index of the move among the mainline moves.
    pub move_index: usize,
    /// Position before the move.
    pub fen: String,
    pub played_move: String,
    pub played_san: String,
    pub classification: MoveQuality,
    pub best_move: String,
    pub best_san: String,
    #[serde(with = "color_name")]
    pub player_color: Color,
}

/// Lists the blunders and inaccuracies of the mainline, in game order.
///
/// Each move is judged against the tactical evaluation stored on the position
/// it was played from; moves from positions without one are skipped. With
/// `color`, only that side's moves are reported.
pub fn find_mistakes(
    tree: &GameTree,
    config: &ClassifierConfig,
    color: Option<Color>,
) -> Result<Vec<MistakePosition>, TreeError> {
    let line = tree.main_line();
    let mut mistakes = Vec::new();

    for (move_index, pair) in line.windows(2).enumerate() {
        let parent = tree.node(pair[0])?;
        let child = tree.node(pair[1])?;
        if color.is_some_and(|c| c != parent.turn()) {
            continue;
        }
        let (Some(bundle), Some(played_move), Some(played_san)) = (
            parent.analysis().stockfish.as_ref(),
            child.move_uci(),
            child.san(),
        ) else {
            continue;
        };

        let verdict = classify_move(bundle, None, played_move, config);
        if !verdict.is_mistake() {
            continue;
        }

        let best_san = position::uci_to_san(parent.fen(), &bundle.model_move)?;
        mistakes.push(MistakePosition {
            move_index,
            fen: parent.fen().to_string(),
            played_move: played_move.to_string(),
            played_san: played_san.to_string(),
            classification: verdict.quality(),
            best_move: bundle.model_move.clone(),
            best_san,
            player_color: parent.turn(),
        });
    }

    Ok(mistakes)
}

mod color_name {
    use chess_core::Color;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(color: &Color, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match color {
            Color::White => "white",
            Color::Black => "black",
        })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Color, D::Error> {
        match String::deserialize(deserializer)?.as_str() {
            "white" => Ok(Color::White),
            "black" => Ok(Color::Black),
            other => Err(de::Error::unknown_variant(other, &["white", "black"])),
        }
    }
}
