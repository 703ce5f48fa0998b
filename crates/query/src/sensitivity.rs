//! Window sensitivity and Laplace noise scale.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use privid_common::error::{PrividError, PrividResult};
use privid_model::privacy::{Bound, PrivacyParams, WindowFn};

/// Unit a noise scale is reported in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseUnit {
    /// Units of the query result; what the noise engine consumes.
    #[default]
    Chunks,
    /// Scaled by `frames_per_chunk`. Reporting only.
    Frames,
}

impl fmt::Display for NoiseUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Chunks => f.write_str("chunks"),
            Self::Frames => f.write_str("frames"),
        }
    }
}

impl FromStr for NoiseUnit {
    type Err = PrividError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chunks" => Ok(Self::Chunks),
            "frames" => Ok(Self::Frames),
            other => Err(PrividError::config(format!("Unknown noise unit '{other}'"))),
        }
    }
}

/// Chunks a single object can influence: `ceil(persistence / fpc) + 1`.
///
/// The extra chunk accounts for an object straddling a chunk boundary.
pub fn persistence_chunks(persistence_frames: f64, frames_per_chunk: usize) -> PrividResult<f64> {
    if frames_per_chunk == 0 {
        return Err(PrividError::config("frames_per_chunk must be positive"));
    }
    if !persistence_frames.is_finite() || persistence_frames < 0.0 {
        return Err(PrividError::config(format!(
            "Persistence must be a non-negative frame count, got {persistence_frames}"
        )));
    }
    Ok((persistence_frames / frames_per_chunk as f64).ceil() + 1.0)
}

/// Bounded change one object can cause in a window aggregate.
///
/// An object seen in `k_segments` separate segments of the recording touches
/// up to `k_segments` persistence spans, so the chunk count scales with it.
pub fn sensitivity(
    lower: &Bound,
    upper: &Bound,
    persistence_frames: f64,
    k_segments: u32,
    frames_per_chunk: usize,
    chunks_per_window: usize,
    window_fn: WindowFn,
) -> PrividResult<f64> {
    if k_segments == 0 {
        return Err(PrividError::config("k_segments must be at least 1"));
    }
    let range = upper.highest() - lower.lowest();
    let chunks = k_segments as f64 * persistence_chunks(persistence_frames, frames_per_chunk)?;

    match window_fn {
        WindowFn::Sum => Ok(range * chunks),
        WindowFn::Mean => {
            if chunks_per_window == 0 {
                return Err(PrividError::config("chunks_per_window must be positive"));
            }
            Ok(range * chunks / (frames_per_chunk * chunks_per_window) as f64)
        }
        WindowFn::Max | WindowFn::Median => Err(PrividError::config(format!(
            "No sensitivity bound for window function '{window_fn}'"
        ))),
    }
}

/// `sensitivity / epsilon`, optionally rescaled to frame units.
pub fn noise_scale(
    params: &PrivacyParams,
    persistence_frames: f64,
    frames_per_chunk: usize,
    chunks_per_window: usize,
    window_fn: WindowFn,
    unit: NoiseUnit,
) -> PrividResult<f64> {
    let sensitivity = sensitivity(
        &params.lower,
        &params.upper,
        persistence_frames,
        params.k_segments,
        frames_per_chunk,
        chunks_per_window,
        window_fn,
    )?;
    let scale = sensitivity / params.epsilon;
    Ok(match unit {
        NoiseUnit::Chunks => scale,
        NoiseUnit::Frames => scale * frames_per_chunk as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_rounds_up_plus_one() {
        assert_eq!(persistence_chunks(200.0, 100).unwrap(), 3.0);
        assert_eq!(persistence_chunks(201.0, 100).unwrap(), 4.0);
        assert_eq!(persistence_chunks(0.0, 100).unwrap(), 1.0);
        assert!(persistence_chunks(-1.0, 100).is_err());
        assert!(persistence_chunks(10.0, 0).is_err());
    }

    #[test]
    fn sum_sensitivity() {
        let s = sensitivity(&Bound::Scalar(0.0), &Bound::Scalar(10.0), 200.0, 1, 100, 5, WindowFn::Sum).unwrap();
        assert_eq!(s, 30.0);

        let params = PrivacyParams::new(0.0, 10.0).with_epsilon(2.0);
        let scale = noise_scale(&params, 200.0, 100, 5, WindowFn::Sum, NoiseUnit::Chunks).unwrap();
        assert_eq!(scale, 15.0);
    }

    #[test]
    fn mean_sensitivity_divides_by_window_frames() {
        let s = sensitivity(&Bound::Scalar(0.0), &Bound::Scalar(10.0), 200.0, 1, 100, 5, WindowFn::Mean).unwrap();
        assert!((s - 30.0 / 500.0).abs() < 1e-12);
    }

    #[test]
    fn vector_bounds_reduce_to_widest_range() {
        let lower = Bound::PerSplit(vec![1.0, 0.0]);
        let upper = Bound::PerSplit(vec![4.0, 6.0]);
        let s = sensitivity(&lower, &upper, 100.0, 1, 100, 1, WindowFn::Sum).unwrap();
        assert_eq!(s, 12.0);
    }

    #[test]
    fn frame_units_scale_by_chunk_size() {
        let params = PrivacyParams::new(0.0, 10.0);
        let chunks = noise_scale(&params, 200.0, 100, 5, WindowFn::Sum, NoiseUnit::Chunks).unwrap();
        let frames = noise_scale(&params, 200.0, 100, 5, WindowFn::Sum, NoiseUnit::Frames).unwrap();
        assert_eq!(frames, chunks * 100.0);
    }

    #[test]
    fn k_segments_multiply_the_persistence_span() {
        let lower = Bound::Scalar(0.0);
        let upper = Bound::Scalar(10.0);
        let one = sensitivity(&lower, &upper, 200.0, 1, 100, 5, WindowFn::Sum).unwrap();
        let two = sensitivity(&lower, &upper, 200.0, 2, 100, 5, WindowFn::Sum).unwrap();
        assert_eq!(two, 60.0);
        assert_eq!(two, 2.0 * one);

        let mean = sensitivity(&lower, &upper, 200.0, 3, 100, 5, WindowFn::Mean).unwrap();
        assert!((mean - 90.0 / 500.0).abs() < 1e-12);

        let params = PrivacyParams::new(0.0, 10.0).with_epsilon(2.0).with_k_segments(2);
        let scale = noise_scale(&params, 200.0, 100, 5, WindowFn::Sum, NoiseUnit::Chunks).unwrap();
        assert_eq!(scale, 30.0);

        let err = sensitivity(&lower, &upper, 200.0, 0, 100, 5, WindowFn::Sum).unwrap_err();
        assert!(matches!(err, PrividError::Config { .. }));
    }

    #[test]
    fn unbounded_window_functions_are_rejected() {
        for window_fn in [WindowFn::Max, WindowFn::Median] {
            let err = sensitivity(&Bound::Scalar(0.0), &Bound::Scalar(1.0), 10.0, 1, 10, 1, window_fn).unwrap_err();
            assert!(matches!(err, PrividError::Config { .. }));
        }
    }
}
