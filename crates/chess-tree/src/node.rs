//! Tree nodes.

use chess_core::{Color, NodeAnalysis};
use serde::{Deserialize, Serialize};

/// Index of a node in its [`GameTree`](crate::GameTree) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root node of every tree.
    pub const ROOT: NodeId = NodeId(0);

    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A position in the game tree and the move that reached it.
///
/// The parent link is a plain index; ownership runs only through
/// `children`. Structural fields are changed by the tree alone.
#[derive(Debug, Clone)]
pub struct GameNode {
    pub(crate) fen: String,
    pub(crate) mv: Option<String>,
    pub(crate) san: Option<String>,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) main_child: Option<NodeId>,
    pub(crate) is_mainline: bool,
    pub(crate) turn: Color,
    pub(crate) move_number: u32,
    pub(crate) analysis: NodeAnalysis,
}

impl GameNode {
    /// Complete six-field FEN of the position.
    pub fn fen(&self) -> &str {
        &self.fen
    }

    /// Coordinate move that reached this node; `None` at the root.
    pub fn move_uci(&self) -> Option<&str> {
        self.mv.as_deref()
    }

    /// SAN of the move that reached this node; `None` at the root.
    pub fn san(&self) -> Option<&str> {
        self.san.as_deref()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in discovery order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn main_child(&self) -> Option<NodeId> {
        self.main_child
    }

    /// Children other than the mainline one, in discovery order.
    pub fn variations(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children
            .iter()
            .copied()
            .filter(move |c| Some(*c) != self.main_child)
    }

    /// True for the root and for a node that is its parent's main child.
    pub fn is_mainline(&self) -> bool {
        self.is_mainline
    }

    /// Side to move in this node's position.
    pub fn turn(&self) -> Color {
        self.turn
    }

    /// Number this node's move is written under in move text.
    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    pub fn analysis(&self) -> &NodeAnalysis {
        &self.analysis
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
