//! PGN (Portable Game Notation) export.
//!
//! Move text is produced by replaying each node's SAN against a scratch
//! position, so a tree whose SAN no longer fits its positions is reported
//! instead of being written out.

use chess_core::position::{self, resolve_san};
use shakmaty::{Chess, Color, Position};
use thiserror::Error;

use crate::node::NodeId;
use crate::tree::{GameTree, TreeError};

/// Errors that can occur while writing move text.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PgnError {
    /// A stored move could not be replayed; the tree is inconsistent.
    #[error("corrupt tree at node {node:?}: {reason}")]
    Corrupt { node: NodeId, reason: String },
    /// The tree itself could not be read.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Accumulates move-text tokens with PGN spacing rules.
#[derive(Default)]
struct MoveText(String);

impl MoveText {
    fn token(&mut self, token: &str) {
        if !self.0.is_empty() && !self.0.ends_with('(') {
            self.0.push(' ');
        }
        self.0.push_str(token);
    }

    fn open(&mut self) {
        self.token("(");
    }

    fn close(&mut self) {
        self.0.push(')');
    }
}

impl GameTree {
    /// Writes the game as PGN: header tags, a blank line, then move text
    /// ending in the result (`*` when no result is set).
    ///
    /// With `include_variations`, every variation is written in parentheses
    /// right after the mainline move it replaces.
    pub fn to_pgn(&self, include_variations: bool) -> Result<String, PgnError> {
        let mut out = String::new();
        for (tag, value) in self.headers() {
            out.push_str(&format!("[{} \"{}\"]\n", tag, escape(value)));
        }
        if !out.is_empty() {
            out.push('\n');
        }

        let root = self.node(NodeId::ROOT)?;
        let pos = position::parse_position(root.fen()).map_err(|e| PgnError::Corrupt {
            node: NodeId::ROOT,
            reason: e.to_string(),
        })?;

        let mut text = MoveText::default();
        self.write_line(NodeId::ROOT, pos, true, include_variations, &mut text)?;
        text.token(self.header("Result").unwrap_or("*"));

        out.push_str(&text.0);
        out.push('\n');
        Ok(out)
    }

    /// Writes the mainline continuing from `start`, whose position is `pos`.
    fn write_line(
        &self,
        start: NodeId,
        mut pos: Chess,
        mut need_number: bool,
        include_variations: bool,
        text: &mut MoveText,
    ) -> Result<(), PgnError> {
        let mut current = start;
        loop {
            let node = self.node(current)?;
            let Some(main) = node.main_child() else {
                if include_variations {
                    for child in node.children().to_vec() {
                        self.write_variation(child, &pos, text)?;
                    }
                }
                return Ok(());
            };

            let after_main = self.write_move(main, &pos, need_number, text)?;
            need_number = false;

            if include_variations {
                for child in node.variations().collect::<Vec<_>>() {
                    self.write_variation(child, &pos, text)?;
                    need_number = true;
                }
            }

            pos = after_main;
            current = main;
        }
    }

    /// Writes `(move continuation...)` for a child, starting from a copy of
    /// the branch point position.
    fn write_variation(
        &self,
        child: NodeId,
        pos: &Chess,
        text: &mut MoveText,
    ) -> Result<(), PgnError> {
        text.open();
        let after = self.write_move(child, pos, true, text)?;
        self.write_line(child, after, false, true, text)?;
        text.close();
        Ok(())
    }

    /// Writes one move (with its number when needed) and returns the
    /// position after it.
    fn write_move(
        &self,
        id: NodeId,
        pos: &Chess,
        need_number: bool,
        text: &mut MoveText,
    ) -> Result<Chess, PgnError> {
        let node = self.node(id)?;
        let san = node.san().ok_or_else(|| PgnError::Corrupt {
            node: id,
            reason: "node has no move".to_string(),
        })?;
        let m = resolve_san(pos, san).map_err(|e| PgnError::Corrupt {
            node: id,
            reason: e.to_string(),
        })?;

        let number = pos.fullmoves().get();
        match pos.turn() {
            Color::White => text.token(&format!("{}.", number)),
            Color::Black if need_number => text.token(&format!("{}...", number)),
            Color::Black => {}
        }
        text.token(san);

        let mut next = pos.clone();
        next.play_unchecked(&m);
        Ok(next)
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::STARTPOS;

    #[test]
    fn empty_game_is_just_the_result() {
        let tree = GameTree::default();
        assert_eq!(tree.to_pgn(true).unwrap(), "*\n");
    }

    #[test]
    fn mainline_with_headers_and_result() {
        let mut tree = GameTree::from_san_moves(STARTPOS, &["e4", "e5", "Nf3"]).unwrap();
        tree.set_header("White", "Alice");
        tree.set_result("1-0", Some("normal"));

        let pgn = tree.to_pgn(false).unwrap();
        assert_eq!(
            pgn,
            "[White \"Alice\"]\n[Result \"1-0\"]\n[Termination \"normal\"]\n\n1. e4 e5 2. Nf3 1-0\n"
        );
    }

    #[test]
    fn variations_are_parenthesized_after_the_main_move() {
        let mut tree = GameTree::from_san_moves(STARTPOS, &["e4", "e5", "Nf3"]).unwrap();
        let e4 = tree.node_at_ply(1).unwrap();
        let c5 = tree.play_variation(e4, "c7c5").unwrap();
        tree.play_main_move(c5, "g1f3").unwrap();
        tree.play_variation(NodeId::ROOT, "d2d4").unwrap();

        let pgn = tree.to_pgn(true).unwrap();
        assert_eq!(pgn, "1. e4 (1. d4) 1... e5 (1... c5 2. Nf3) 2. Nf3 *\n");

        let without = tree.to_pgn(false).unwrap();
        assert_eq!(without, "1. e4 e5 2. Nf3 *\n");
    }

    #[test]
    fn black_to_move_start_uses_ellipsis() {
        let fen = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        let tree = GameTree::from_san_moves(fen, &["c5", "Nf3"]).unwrap();
        let pgn = tree.to_pgn(false).unwrap();
        assert!(pgn.starts_with("[SetUp \"1\"]\n[FEN \""));
        assert!(pgn.ends_with("\n\n1... c5 2. Nf3 *\n"));
    }

    #[test]
    fn start_board_with_later_counters_gets_a_fen_tag() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 7";
        let tree = GameTree::from_san_moves(fen, &["e4", "e5"]).unwrap();
        let pgn = tree.to_pgn(false).unwrap();
        assert_eq!(
            pgn,
            format!("[SetUp \"1\"]\n[FEN \"{fen}\"]\n\n7. e4 e5 *\n")
        );
    }

    #[test]
    fn header_values_are_escaped() {
        let mut tree = GameTree::default();
        tree.set_header("Event", "The \"Big\" One");
        let pgn = tree.to_pgn(false).unwrap();
        assert!(pgn.starts_with("[Event \"The \\\"Big\\\" One\"]\n"));
    }

    #[test]
    fn inconsistent_san_is_reported() {
        let mut tree = GameTree::default();
        let after_e4 = "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1";
        // SAN that does not belong to the position it claims to reach.
        let bad = tree.add_main_move(NodeId::ROOT, after_e4, "e2e4", "Ke2").unwrap();
        assert!(matches!(
            tree.to_pgn(false),
            Err(PgnError::Corrupt { node, .. }) if node == bad
        ));
    }
}
