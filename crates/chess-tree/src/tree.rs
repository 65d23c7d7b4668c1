//! Arena-allocated game tree.
//!
//! Nodes live in a vector and are referenced by [`NodeId`]. Removing a
//! variation vacates the slots of its subtree; ids are never reused.

use chess_core::fen::{is_standard_start, FenFields};
use chess_core::position::{self, PositionError};
use chess_core::{EvaluationBundle, MaiaAnalysis, NodeAnalysis, STARTPOS};
use thiserror::Error;
use tracing::debug;

use crate::node::{GameNode, NodeId};

/// Errors that can occur when changing the tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    /// The node id does not refer to a live node.
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),
    /// The position string is not a complete, legal FEN.
    #[error("invalid position: {0}")]
    Position(#[from] PositionError),
    /// No child of the node was reached by the move.
    #[error("no child reached by {0}")]
    NoSuchMove(String),
    /// The mainline child cannot be removed as a variation.
    #[error("{0} is the mainline move; promote another variation first")]
    RemoveMainline(String),
}

/// A game's moves, variations and header tags.
#[derive(Debug, Clone)]
pub struct GameTree {
    nodes: Vec<Option<GameNode>>,
    headers: Vec<(String, String)>,
}

impl Default for GameTree {
    fn default() -> Self {
        Self::new(STARTPOS).expect("STARTPOS is valid")
    }
}

impl GameTree {
    /// Creates a tree rooted at `fen`.
    ///
    /// A non-standard start adds the `SetUp` and `FEN` tags.
    pub fn new(fen: &str) -> Result<Self, TreeError> {
        position::parse_position(fen)?;
        let fields = FenFields::parse(fen).map_err(PositionError::from)?;
        let root = GameNode {
            fen: fen.to_string(),
            mv: None,
            san: None,
            parent: None,
            children: Vec::new(),
            main_child: None,
            is_mainline: true,
            turn: fields.side_to_move,
            move_number: fields.fullmove_number,
            analysis: NodeAnalysis::default(),
        };

        let mut headers = Vec::new();
        if !is_standard_start(fen) {
            headers.push(("SetUp".to_string(), "1".to_string()));
            headers.push(("FEN".to_string(), fen.to_string()));
        }

        Ok(Self {
            nodes: vec![Some(root)],
            headers,
        })
    }

    /// Builds a mainline by playing SAN moves from `fen`.
    ///
    /// Every move is checked before any node is created.
    pub fn from_san_moves<S: AsRef<str>>(fen: &str, sans: &[S]) -> Result<Self, TreeError> {
        let mut played = Vec::with_capacity(sans.len());
        let mut current = fen.to_string();
        for san in sans {
            let next = position::apply_san(&current, san.as_ref())?;
            current = next.fen.clone();
            played.push(next);
        }

        let mut tree = Self::new(fen)?;
        let mut node = NodeId::ROOT;
        for mv in played {
            node = tree.add_main_move(node, &mv.fen, &mv.uci, &mv.san)?;
        }
        Ok(tree)
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Looks up a live node.
    pub fn get(&self, id: NodeId) -> Option<&GameNode> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Looks up a live node, failing on vacant or out-of-range ids.
    pub fn node(&self, id: NodeId) -> Result<&GameNode, TreeError> {
        self.get(id).ok_or(TreeError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut GameNode, TreeError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::UnknownNode(id))
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    /// Always false: the root cannot be removed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn new_child(
        &mut self,
        parent: NodeId,
        fen: &str,
        mv: &str,
        san: &str,
        is_mainline: bool,
    ) -> Result<NodeId, TreeError> {
        let move_number = FenFields::parse(self.node(parent)?.fen())
            .map_err(PositionError::from)?
            .fullmove_number;
        position::parse_position(fen)?;
        let turn = FenFields::parse(fen)
            .map_err(PositionError::from)?
            .side_to_move;

        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(GameNode {
            fen: fen.to_string(),
            mv: Some(mv.to_string()),
            san: Some(san.to_string()),
            parent: Some(parent),
            children: Vec::new(),
            main_child: None,
            is_mainline,
            turn,
            move_number,
            analysis: NodeAnalysis::default(),
        }));
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    /// Appends a new mainline child to `parent`.
    ///
    /// An existing mainline child is demoted to a variation: it stays in
    /// `children` but is no longer reached by mainline walks.
    pub fn add_main_move(
        &mut self,
        parent: NodeId,
        fen: &str,
        mv: &str,
        san: &str,
    ) -> Result<NodeId, TreeError> {
        let previous = self.node(parent)?.main_child;
        let id = self.new_child(parent, fen, mv, san, true)?;
        if let Some(old) = previous {
            let old_node = self.node_mut(old)?;
            old_node.is_mainline = false;
            debug!(
                parent = parent.index(),
                demoted = old_node.mv.as_deref().unwrap_or("?"),
                "mainline child replaced"
            );
        }
        self.node_mut(parent)?.main_child = Some(id);
        Ok(id)
    }

    /// Returns the child of `parent` reached by `mv`, creating a variation
    /// if there is none yet.
    pub fn add_variation(
        &mut self,
        parent: NodeId,
        fen: &str,
        mv: &str,
        san: &str,
    ) -> Result<NodeId, TreeError> {
        if let Some(existing) = self.child_by_move(parent, mv)? {
            return Ok(existing);
        }
        self.new_child(parent, fen, mv, san, false)
    }

    /// Plays a coordinate move as the new mainline continuation of `parent`.
    pub fn play_main_move(&mut self, parent: NodeId, uci: &str) -> Result<NodeId, TreeError> {
        let played = position::apply_uci(self.node(parent)?.fen(), uci)?;
        self.add_main_move(parent, &played.fen, &played.uci, &played.san)
    }

    /// Plays a coordinate move as a variation of `parent`.
    pub fn play_variation(&mut self, parent: NodeId, uci: &str) -> Result<NodeId, TreeError> {
        let played = position::apply_uci(self.node(parent)?.fen(), uci)?;
        self.add_variation(parent, &played.fen, &played.uci, &played.san)
    }

    /// Child of `parent` reached by `mv`, preferring the mainline child.
    pub fn child_by_move(&self, parent: NodeId, mv: &str) -> Result<Option<NodeId>, TreeError> {
        let node = self.node(parent)?;
        let mut found = None;
        for &child in &node.children {
            let child_node = self.node(child)?;
            if child_node.mv.as_deref() == Some(mv) {
                if child_node.is_mainline {
                    return Ok(Some(child));
                }
                found.get_or_insert(child);
            }
        }
        Ok(found)
    }

    /// Makes the variation reached by `mv` the mainline child of `parent`,
    /// demoting the current one. Promoting the mainline child is a no-op.
    pub fn promote_variation(&mut self, parent: NodeId, mv: &str) -> Result<NodeId, TreeError> {
        let target = self
            .child_by_move(parent, mv)?
            .ok_or_else(|| TreeError::NoSuchMove(mv.to_string()))?;
        let previous = self.node(parent)?.main_child;
        if previous == Some(target) {
            return Ok(target);
        }
        if let Some(old) = previous {
            self.node_mut(old)?.is_mainline = false;
        }
        self.node_mut(target)?.is_mainline = true;
        self.node_mut(parent)?.main_child = Some(target);
        Ok(target)
    }

    /// Removes the variation reached by `mv` together with its subtree.
    pub fn remove_variation(&mut self, parent: NodeId, mv: &str) -> Result<(), TreeError> {
        let main = self.node(parent)?.main_child;
        let target = self
            .node(parent)?
            .children
            .iter()
            .copied()
            .find(|c| {
                Some(*c) != main && self.get(*c).and_then(|n| n.mv.as_deref()) == Some(mv)
            });

        let Some(target) = target else {
            return match self.child_by_move(parent, mv)? {
                Some(_) => Err(TreeError::RemoveMainline(mv.to_string())),
                None => Err(TreeError::NoSuchMove(mv.to_string())),
            };
        };

        self.node_mut(parent)?.children.retain(|c| *c != target);
        let mut stack = vec![target];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) {
                stack.extend(node.children);
            }
        }
        Ok(())
    }

    /// Root…leaf following mainline children.
    pub fn main_line(&self) -> Vec<NodeId> {
        self.main_line_from(NodeId::ROOT)
    }

    /// `start`…leaf following mainline children. Empty if `start` is unknown.
    pub fn main_line_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut line = Vec::new();
        let mut current = self.get(start).map(|_| start);
        while let Some(id) = current {
            line.push(id);
            current = self.get(id).and_then(|n| n.main_child);
        }
        line
    }

    /// Root…`id` following parent links.
    pub fn path_to(&self, id: NodeId) -> Result<Vec<NodeId>, TreeError> {
        let mut path = vec![id];
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.node(parent)?.parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Mainline node after `ply` half-moves; ply 0 is the root.
    pub fn node_at_ply(&self, ply: usize) -> Option<NodeId> {
        self.main_line().get(ply).copied()
    }

    /// Replaces the tactical evaluation of a node.
    pub fn set_stockfish_analysis(
        &mut self,
        id: NodeId,
        bundle: EvaluationBundle,
    ) -> Result<(), TreeError> {
        self.node_mut(id)?.analysis.stockfish = Some(bundle);
        Ok(())
    }

    /// Replaces the human-move model output of a node.
    pub fn set_maia_analysis(&mut self, id: NodeId, maia: MaiaAnalysis) -> Result<(), TreeError> {
        self.node_mut(id)?.analysis.maia = Some(maia);
        Ok(())
    }

    /// Header tags in insertion order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn header(&self, tag: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == tag)
            .map(|(_, v)| v.as_str())
    }

    /// Sets a header tag, keeping its position if it already exists.
    ///
    /// `SetUp` and `FEN` follow the root position and cannot be set.
    pub fn set_header(&mut self, tag: impl Into<String>, value: impl Into<String>) {
        let tag = tag.into();
        if tag == "SetUp" || tag == "FEN" {
            return;
        }
        let value = value.into();
        match self.headers.iter_mut().find(|(k, _)| *k == tag) {
            Some(entry) => entry.1 = value,
            None => self.headers.push((tag, value)),
        }
    }

    /// Records the game result and, optionally, how it ended.
    pub fn set_result(&mut self, result: &str, termination: Option<&str>) {
        self.set_header("Result", result);
        if let Some(termination) = termination {
            self.set_header("Termination", termination);
        }
    }
}
