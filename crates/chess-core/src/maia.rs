//! Human-move model types and the per-node analysis record.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::evaluation::EvaluationBundle;
use crate::values::MoveValues;

/// Rating buckets the human-move model is queried at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RatingBucket {
    #[serde(rename = "1100")]
    R1100,
    #[serde(rename = "1200")]
    R1200,
    #[serde(rename = "1300")]
    R1300,
    #[serde(rename = "1400")]
    R1400,
    #[serde(rename = "1500")]
    R1500,
    #[serde(rename = "1600")]
    R1600,
    #[serde(rename = "1700")]
    R1700,
    #[serde(rename = "1800")]
    R1800,
    #[serde(rename = "1900")]
    R1900,
}

impl RatingBucket {
    /// Every bucket, lowest first.
    pub const ALL: [RatingBucket; 9] = [
        RatingBucket::R1100,
        RatingBucket::R1200,
        RatingBucket::R1300,
        RatingBucket::R1400,
        RatingBucket::R1500,
        RatingBucket::R1600,
        RatingBucket::R1700,
        RatingBucket::R1800,
        RatingBucket::R1900,
    ];

    /// The rating the bucket stands for.
    pub fn rating(self) -> u32 {
        1100 + 100 * (self as u32)
    }

    /// The bucket for an exact rating, if there is one.
    pub fn from_rating(rating: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.rating() == rating)
    }

    /// The bucket closest to an arbitrary rating.
    pub fn nearest(rating: u32) -> Self {
        let index = (rating.clamp(1100, 1900) + 50 - 1100) / 100;
        Self::ALL[(index as usize).min(Self::ALL.len() - 1)]
    }
}

impl fmt::Display for RatingBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rating())
    }
}

/// Output of the human-move model for one position at one rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaiaEvaluation {
    /// Move probabilities, most likely first.
    pub policy: MoveValues,
    /// Expected score for the side to move (0.0 to 1.0).
    pub value: f64,
}

/// Human-move model output for every queried bucket.
pub type MaiaAnalysis = BTreeMap<RatingBucket, MaiaEvaluation>;

/// Analysis attached to a tree node. Each field is written whole and
/// independently of the other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeAnalysis {
    pub maia: Option<MaiaAnalysis>,
    pub stockfish: Option<EvaluationBundle>,
}
