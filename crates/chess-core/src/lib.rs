//! Core types for chess analysis.
//!
//! This crate provides the types shared by the move tree and the analysis
//! components:
//! - FEN field access and validation
//! - Position services (legal moves, coordinate/SAN conversion) over FEN strings
//! - [`MoveValues`], the ordered move→value sequence used by every evaluation vector
//! - [`EvaluationBundle`] and [`Evaluation`] for tactical evaluations
//! - [`RatingBucket`], [`MaiaEvaluation`] and [`NodeAnalysis`] for per-node analysis

mod evaluation;
pub mod fen;
mod maia;
pub mod position;
mod values;

pub use evaluation::{Evaluation, EvaluationBundle, MATE_CP};
pub use fen::{FenError, FenFields, STARTPOS};
pub use maia::{MaiaAnalysis, MaiaEvaluation, NodeAnalysis, RatingBucket};
pub use position::{PlayedMove, PositionError, Terminal};
pub use shakmaty::Color;
pub use values::MoveValues;
