//! FEN (Forsyth-Edwards Notation) field access.
//!
//! Nodes exchange positions as complete six-field FEN strings. [`FenFields`]
//! splits and checks the textual fields; full legality checking happens in
//! [`crate::position`].

use shakmaty::Color;
use thiserror::Error;

/// The standard starting position FEN.
pub const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Errors that can occur when reading FEN strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FenError {
    #[error("invalid FEN: expected 6 fields, got {0}")]
    FieldCount(usize),

    #[error("invalid piece placement: {0}")]
    PiecePlacement(String),

    #[error("invalid active color: expected 'w' or 'b', got '{0}'")]
    ActiveColor(String),

    #[error("invalid castling rights: {0}")]
    Castling(String),

    #[error("invalid en passant square: {0}")]
    EnPassant(String),

    #[error("invalid move counter: {0}")]
    Counter(String),
}

/// The six whitespace-separated fields of a FEN string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenFields<'a> {
    pub placement: &'a str,
    pub side_to_move: Color,
    pub castling: &'a str,
    pub en_passant: &'a str,
    pub halfmove_clock: u32,
    pub fullmove_number: u32,
}

impl<'a> FenFields<'a> {
    /// Splits and validates a FEN string.
    pub fn parse(fen: &'a str) -> Result<Self, FenError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.len() != 6 {
            return Err(FenError::FieldCount(parts.len()));
        }

        check_placement(parts[0])?;

        let side_to_move = match parts[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::ActiveColor(other.to_string())),
        };

        if parts[2] != "-" && !parts[2].chars().all(|c| "KQkqABCDEFGHabcdefgh".contains(c)) {
            return Err(FenError::Castling(parts[2].to_string()));
        }

        check_en_passant(parts[3])?;

        let halfmove_clock = parts[4]
            .parse::<u32>()
            .map_err(|_| FenError::Counter(parts[4].to_string()))?;
        let fullmove_number = parts[5]
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| FenError::Counter(parts[5].to_string()))?;

        Ok(Self {
            placement: parts[0],
            side_to_move,
            castling: parts[2],
            en_passant: parts[3],
            halfmove_clock,
            fullmove_number,
        })
    }
}

/// Returns true if `fen` is exactly the standard starting position.
///
/// All six fields are compared: a start board with other move counters is
/// numbered differently in move text and needs its own FEN tag.
pub fn is_standard_start(fen: &str) -> bool {
    fen.split_whitespace().eq(STARTPOS.split_whitespace())
}

fn check_placement(placement: &str) -> Result<(), FenError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::PiecePlacement(format!(
            "expected 8 ranks, got {}",
            ranks.len()
        )));
    }

    for (i, rank) in ranks.iter().enumerate() {
        let mut squares = 0;
        for c in rank.chars() {
            match c.to_digit(10) {
                Some(n) => squares += n,
                None if "pnbrqkPNBRQK".contains(c) => squares += 1,
                None => {
                    return Err(FenError::PiecePlacement(format!(
                        "invalid character '{}' in rank {}",
                        c,
                        8 - i
                    )))
                }
            }
        }
        if squares != 8 {
            return Err(FenError::PiecePlacement(format!(
                "rank {} has {} squares, expected 8",
                8 - i,
                squares
            )));
        }
    }

    Ok(())
}

fn check_en_passant(ep: &str) -> Result<(), FenError> {
    if ep == "-" {
        return Ok(());
    }
    let bytes = ep.as_bytes();
    if bytes.len() != 2 || !(b'a'..=b'h').contains(&bytes[0]) || !matches!(bytes[1], b'3' | b'6')
    {
        return Err(FenError::EnPassant(ep.to_string()));
    }
    Ok(())
}
