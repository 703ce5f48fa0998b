//! Per-chunk aggregator output.

use serde::{Deserialize, Serialize};

/// Value produced by one aggregator invocation over one chunk.
///
/// Serializes as a bare number or as a `[value, correction]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkValue {
    Scalar(f64),
    /// Raw value plus the smart-adjust correction for boundary double counting.
    Adjusted([f64; 2]),
}

impl ChunkValue {
    pub fn adjusted(value: f64, correction: f64) -> Self {
        Self::Adjusted([value, correction])
    }

    /// The raw value, ignoring any correction.
    pub fn value(&self) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::Adjusted([v, _]) => *v,
        }
    }

    /// The smart-adjust correction; zero for scalars.
    pub fn correction(&self) -> f64 {
        match self {
            Self::Scalar(_) => 0.0,
            Self::Adjusted([_, c]) => *c,
        }
    }

    /// `max(value - correction, 0)`.
    pub fn smart_adjusted(&self) -> f64 {
        (self.value() - self.correction()).max(0.0)
    }

    /// The value a window sees, with or without smart-adjust.
    pub fn shaped(&self, smart_adjust: bool) -> f64 {
        if smart_adjust {
            self.smart_adjusted()
        } else {
            self.value()
        }
    }
}

impl From<f64> for ChunkValue {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

/// Result stored for one chunk: a single value, or one value per split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkResult {
    Single(ChunkValue),
    Split { splits: Vec<ChunkValue> },
}

impl ChunkResult {
    pub fn split(splits: Vec<ChunkValue>) -> Self {
        Self::Split { splits }
    }

    pub fn as_single(&self) -> Option<&ChunkValue> {
        match self {
            Self::Single(v) => Some(v),
            Self::Split { .. } => None,
        }
    }

    pub fn as_splits(&self) -> Option<&[ChunkValue]> {
        match self {
            Self::Single(_) => None,
            Self::Split { splits } => Some(splits),
        }
    }
}

impl From<ChunkValue> for ChunkResult {
    fn from(value: ChunkValue) -> Self {
        Self::Single(value)
    }
}
