//! Position services over FEN strings.
//!
//! Every position crossing a crate boundary is a FEN string. These helpers
//! parse it into a legal position, apply coordinate or SAN moves, and
//! produce the resulting FEN together with the move's SAN.

use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Outcome, Position};
use thiserror::Error;

use crate::fen::{FenError, FenFields};

/// Errors that can occur when working with positions and moves.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PositionError {
    /// The FEN fields are malformed.
    #[error(transparent)]
    Fen(#[from] FenError),
    /// The FEN is well formed but does not describe a legal position.
    #[error("illegal position {fen}: {reason}")]
    IllegalPosition { fen: String, reason: String },
    /// The move text could not be parsed.
    #[error("unparseable move '{0}'")]
    InvalidMove(String),
    /// The move is not legal in the given position.
    #[error("illegal move {mv} in {fen}")]
    IllegalMove { mv: String, fen: String },
}

/// A move applied to a position, in every notation the tree stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    /// Coordinate notation (e.g. "e2e4", "e7e8q").
    pub uci: String,
    /// Standard algebraic notation including check suffix.
    pub san: String,
    /// Position after the move.
    pub fen: String,
}

/// How a game ended in a terminal position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The side to move is checkmated.
    Checkmate,
    /// Stalemate or insufficient material.
    Draw,
}

/// Parses a FEN string into a legal position.
pub fn parse_position(fen: &str) -> Result<Chess, PositionError> {
    FenFields::parse(fen)?;
    let parsed: Fen = fen.parse().map_err(|e: shakmaty::fen::ParseFenError| {
        PositionError::IllegalPosition {
            fen: fen.to_string(),
            reason: e.to_string(),
        }
    })?;
    parsed
        .into_position(CastlingMode::Standard)
        .map_err(|e| PositionError::IllegalPosition {
            fen: fen.to_string(),
            reason: e.to_string(),
        })
}

/// Serializes a position as a complete six-field FEN.
pub fn to_fen(pos: &Chess) -> String {
    Fen::from_position(pos.clone(), EnPassantMode::Legal).to_string()
}

/// Side to move of a FEN string.
pub fn side_to_move(fen: &str) -> Result<Color, PositionError> {
    Ok(FenFields::parse(fen)?.side_to_move)
}

/// All legal moves of the position in coordinate notation, in generator order.
pub fn legal_moves(fen: &str) -> Result<Vec<String>, PositionError> {
    let pos = parse_position(fen)?;
    Ok(pos
        .legal_moves()
        .iter()
        .map(|m| m.to_uci(CastlingMode::Standard).to_string())
        .collect())
}

/// Returns how the game ended if the position has no legal continuation.
pub fn terminal_state(pos: &Chess) -> Option<Terminal> {
    match pos.outcome() {
        Some(Outcome::Decisive { .. }) => Some(Terminal::Checkmate),
        Some(Outcome::Draw) => Some(Terminal::Draw),
        None => None,
    }
}

/// Resolves a coordinate move against a position.
pub fn resolve_uci(pos: &Chess, uci: &str) -> Result<Move, PositionError> {
    let parsed: UciMove = uci
        .parse()
        .map_err(|_| PositionError::InvalidMove(uci.to_string()))?;
    parsed.to_move(pos).map_err(|_| PositionError::IllegalMove {
        mv: uci.to_string(),
        fen: to_fen(pos),
    })
}

/// Resolves a SAN move (with or without check suffix) against a position.
pub fn resolve_san(pos: &Chess, san: &str) -> Result<Move, PositionError> {
    let parsed: SanPlus = san
        .parse()
        .map_err(|_| PositionError::InvalidMove(san.to_string()))?;
    parsed.san.to_move(pos).map_err(|_| PositionError::IllegalMove {
        mv: san.to_string(),
        fen: to_fen(pos),
    })
}

/// Plays a resolved move, describing it in every notation.
pub fn play(pos: &Chess, m: &Move) -> PlayedMove {
    let san = SanPlus::from_move(pos.clone(), m).to_string();
    let mut next = pos.clone();
    next.play_unchecked(m);
    PlayedMove {
        uci: m.to_uci(CastlingMode::Standard).to_string(),
        san,
        fen: to_fen(&next),
    }
}

/// Applies a coordinate move to a FEN.
pub fn apply_uci(fen: &str, uci: &str) -> Result<PlayedMove, PositionError> {
    let pos = parse_position(fen)?;
    let m = resolve_uci(&pos, uci)?;
    Ok(play(&pos, &m))
}

/// Applies a SAN move to a FEN.
pub fn apply_san(fen: &str, san: &str) -> Result<PlayedMove, PositionError> {
    let pos = parse_position(fen)?;
    let m = resolve_san(&pos, san)?;
    Ok(play(&pos, &m))
}

/// Converts a coordinate move to SAN (without playing it on the caller's copy).
pub fn uci_to_san(fen: &str, uci: &str) -> Result<String, PositionError> {
    apply_uci(fen, uci).map(|played| played.san)
}

/// SAN without the check or mate suffix, as used for comparisons.
pub fn bare_san(pos: &Chess, m: &Move) -> String {
    San::from_move(pos, m).to_string()
}
