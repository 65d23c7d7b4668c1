//! Game move tree.
//!
//! This crate provides:
//! - [`GameTree`] - arena-owned nodes holding a game's mainline and variations
//! - [`GameNode`] - one position, the move that reached it, and its analysis
//! - PGN move-text export with recursive variations
//!
//! # Example
//!
//! ```
//! use chess_tree::{GameTree, NodeId};
//!
//! let mut tree = GameTree::default();
//! let e4 = tree.play_main_move(NodeId::ROOT, "e2e4").unwrap();
//! tree.play_main_move(e4, "e7e5").unwrap();
//! tree.play_variation(e4, "c7c5").unwrap();
//! assert_eq!(tree.to_pgn(true).unwrap(), "1. e4 e5 (1... c5) *\n");
//! ```

mod node;
mod pgn;
mod tree;

pub use node::{GameNode, NodeId};
pub use pgn::PgnError;
pub use tree::{GameTree, TreeError};
