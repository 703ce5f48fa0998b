//! Privacy parameters and the aggregation functions they constrain.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use privid_common::error::{PrividError, PrividResult};

use crate::source::DataSource;

/// A clipping bound: one value for the whole scene, or one per spatial split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Scalar(f64),
    PerSplit(Vec<f64>),
}

impl Bound {
    /// Smallest value; the bound itself when scalar.
    pub fn lowest(&self) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::PerSplit(vs) => vs.iter().copied().fold(f64::INFINITY, f64::min),
        }
    }

    /// Largest value; the bound itself when scalar.
    pub fn highest(&self) -> f64 {
        match self {
            Self::Scalar(v) => *v,
            Self::PerSplit(vs) => vs.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }

    /// Bound of one split. `None` for scalar bounds or out-of-range splits.
    pub fn for_split(&self, split: usize) -> Option<f64> {
        match self {
            Self::Scalar(_) => None,
            Self::PerSplit(vs) => vs.get(split).copied(),
        }
    }

    /// Number of per-split entries, if any.
    pub fn split_count(&self) -> Option<usize> {
        match self {
            Self::Scalar(_) => None,
            Self::PerSplit(vs) => Some(vs.len()),
        }
    }

    fn values(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::PerSplit(vs) => vs,
        }
    }
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f64>> for Bound {
    fn from(values: Vec<f64>) -> Self {
        Self::PerSplit(values)
    }
}

/// How per-split values of one chunk are merged into one value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCombine {
    #[default]
    Sum,
    Mean,
    Max,
}

impl SplitCombine {
    pub fn combine(&self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}

impl FromStr for SplitCombine {
    type Err = PrividError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            other => Err(PrividError::config(format!(
                "Unknown split combination '{other}'"
            ))),
        }
    }
}

/// Function reducing the shaped chunk values of one window to one number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFn {
    Sum,
    Mean,
    /// No sensitivity bound; ground-truth queries only.
    Max,
    /// No sensitivity bound; ground-truth queries only.
    Median,
}

impl WindowFn {
    pub fn apply(&self, values: &[f64]) -> f64 {
        match self {
            Self::Sum => values.iter().sum(),
            Self::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Self::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::Median => median(values),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Mean => "mean",
            Self::Max => "max",
            Self::Median => "median",
        }
    }
}

impl fmt::Display for WindowFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WindowFn {
    type Err = PrividError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "mean" => Ok(Self::Mean),
            "max" => Ok(Self::Max),
            "median" => Ok(Self::Median),
            other => Err(PrividError::config(format!("Unknown window function '{other}'"))),
        }
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) * 0.5
    } else {
        sorted[mid]
    }
}

/// Differential-privacy parameters of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyParams {
    /// Privacy budget. Smaller means more noise.
    pub epsilon: f64,

    /// Lower clipping bound, in units of the query result.
    pub lower: Bound,

    /// Upper clipping bound, in units of the query result.
    pub upper: Bound,

    /// Merge of per-split values (spatial-hybrid only).
    #[serde(default)]
    pub split_combine: SplitCombine,

    /// Number of spatial splits (spatial-hybrid only).
    #[serde(default)]
    pub num_splits: Option<usize>,

    /// Segments of the recording one individual may appear in. Each segment
    /// contributes its own persistence span to the sensitivity.
    #[serde(default = "default_k_segments")]
    pub k_segments: u32,
}

fn default_k_segments() -> u32 {
    1
}

impl PrivacyParams {
    /// Scene-wide bounds with `epsilon = 1`.
    pub fn new(lower: impl Into<Bound>, upper: impl Into<Bound>) -> Self {
        Self {
            epsilon: 1.0,
            lower: lower.into(),
            upper: upper.into(),
            split_combine: SplitCombine::Sum,
            num_splits: None,
            k_segments: default_k_segments(),
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }

    pub fn with_k_segments(mut self, k_segments: u32) -> Self {
        self.k_segments = k_segments;
        self
    }

    pub fn with_splits(mut self, num_splits: usize, combine: SplitCombine) -> Self {
        self.num_splits = Some(num_splits);
        self.split_combine = combine;
        self
    }

    /// Bounds reduced to one conservative scene-wide range.
    pub fn reduced_range(&self) -> (f64, f64) {
        (self.lower.lowest(), self.upper.highest())
    }

    /// Check internal consistency and the requirements of `source`.
    pub fn validate_for(&self, source: DataSource) -> PrividResult<()> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(PrividError::config(format!(
                "Epsilon must be positive, got {}",
                self.epsilon
            )));
        }
        if self.k_segments == 0 {
            return Err(PrividError::config("k_segments must be at least 1"));
        }

        for (name, bound) in [("lower", &self.lower), ("upper", &self.upper)] {
            if bound.values().is_empty() {
                return Err(PrividError::config(format!("Empty {name} bound")));
            }
            if bound.values().iter().any(|v| !v.is_finite()) {
                return Err(PrividError::config(format!("Non-finite {name} bound")));
            }
            if let (Some(len), Some(n)) = (bound.split_count(), self.num_splits) {
                if len != n {
                    return Err(PrividError::config(format!(
                        "{name} bound has {len} entries for {n} splits"
                    )));
                }
            }
        }

        let (lower, upper) = self.reduced_range();
        if lower > upper {
            return Err(PrividError::config(format!(
                "Lower bound {lower} exceeds upper bound {upper}"
            )));
        }

        match source {
            DataSource::SpatialHybrid => match self.num_splits {
                Some(n) if n > 0 => Ok(()),
                _ => Err(PrividError::config(
                    "Spatial-hybrid queries need a positive split count",
                )),
            },
            DataSource::Original | DataSource::JustHybrid => Ok(()),
            DataSource::OriginalWithHybrid => Err(source.unsupported()),
        }
    }
}
