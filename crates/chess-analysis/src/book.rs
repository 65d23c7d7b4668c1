//! Opening books for shallow positions.
//!
//! A book supplies observed human move frequencies that replace the model's
//! inferred probabilities for the moves it covers.

use std::collections::HashMap;
use std::path::Path;

use chess_core::{MoveValues, RatingBucket};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading an opening book.
#[derive(Debug, Error)]
pub enum BookError {
    /// Failed to read the book file.
    #[error("failed to read opening book: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Source of book move probabilities.
pub trait OpeningBook: Send + Sync {
    /// Book policy for the side to move in `fen` at `bucket`, if covered.
    fn lookup(&self, fen: &str, bucket: RatingBucket) -> Option<MoveValues>;
}

/// Merges a book policy into an inferred one.
///
/// Covered moves take the book probability, uncovered moves keep the inferred
/// probability, and the result is renormalized. Inferred order is kept;
/// book-only moves follow it.
pub fn merge_policy(inferred: &MoveValues, book: &MoveValues) -> MoveValues {
    let mut merged: MoveValues = inferred
        .iter()
        .map(|(mv, p)| (mv, book.get(mv).unwrap_or(p)))
        .collect();
    for (mv, p) in book.iter() {
        if !merged.contains(mv) {
            merged.insert(mv, p);
        }
    }
    merged.normalized()
}

/// A single move from an opening book with its frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMove {
    /// The move in UCI notation (e.g., "e2e4").
    pub uci: String,
    /// Weight/frequency of this move (higher = more common).
    pub weight: u32,
}

/// One position of a JSON opening book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookEntry {
    pub fen: String,
    /// Buckets the entry applies to; all buckets when absent.
    #[serde(default)]
    pub ratings: Option<Vec<RatingBucket>>,
    pub moves: Vec<BookMove>,
}

/// Opening book read from a JSON array of [`BookEntry`] values.
///
/// Positions are matched on placement, side to move, castling and en passant
/// fields; move counters are ignored.
#[derive(Debug, Clone, Default)]
pub struct JsonOpeningBook {
    positions: HashMap<String, Vec<BookEntry>>,
}

impl JsonOpeningBook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a book from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BookError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self, BookError> {
        let entries: Vec<BookEntry> = serde_json::from_str(json)?;
        let mut book = Self::new();
        for entry in entries {
            book.add_entry(entry);
        }
        Ok(book)
    }

    pub fn add_entry(&mut self, entry: BookEntry) {
        self.positions
            .entry(position_key(&entry.fen))
            .or_default()
            .push(entry);
    }

    /// Number of distinct positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl OpeningBook for JsonOpeningBook {
    fn lookup(&self, fen: &str, bucket: RatingBucket) -> Option<MoveValues> {
        let entry = self.positions.get(&position_key(fen))?.iter().find(|e| {
            e.ratings
                .as_ref()
                .map_or(true, |ratings| ratings.contains(&bucket))
        })?;

        let total: u32 = entry.moves.iter().map(|m| m.weight).sum();
        if total == 0 {
            return None;
        }
        Some(
            entry
                .moves
                .iter()
                .map(|m| (m.uci.as_str(), f64::from(m.weight) / f64::from(total)))
                .collect(),
        )
    }
}

fn position_key(fen: &str) -> String {
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}
