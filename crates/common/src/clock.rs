//! Frame-rate decimation.
//!
//! Raw detections are recorded at the camera's native rate but analyzed at a
//! lower rate. Converting between the two with a fixed integer stride drifts
//! whenever the ratio is fractional (30 fps to 8 fps is a stride of 3.75), so
//! the decimator carries the rounding error of every step into the next one.
//! Over one hour the emitted strides add up to exactly the native frame count.
//!
//! The carried error is an integer in units of `1 / analysis_fps` frames, so
//! every exact tie is seen as a tie and rounds to even. Carrying it as a float
//! instead lets representation error push some ties one way or the other:
//! for rate pairs such as 11 to 6 or 17 to 10 the two approaches place a few
//! frames one index apart. Frame counts per hour are the same either way, and
//! pairs whose stride is exact in binary (30 to 8) give identical sequences.

use crate::error::{PrividError, PrividResult};

/// Seconds covered by one raw detection file.
pub const SECS_PER_HOUR: u64 = 3600;

/// Produces the native frame indices sampled at the analysis rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDecimator {
    native_fps: u32,
    analysis_fps: u32,
}

impl FrameDecimator {
    /// Create a decimator from `native_fps` down to `analysis_fps`.
    pub fn new(native_fps: u32, analysis_fps: u32) -> PrividResult<Self> {
        if native_fps == 0 || analysis_fps == 0 {
            return Err(PrividError::config(format!(
                "Frame rates must be positive (native={native_fps}, analysis={analysis_fps})"
            )));
        }
        if analysis_fps > native_fps {
            return Err(PrividError::config(format!(
                "Analysis rate {analysis_fps} exceeds native rate {native_fps}"
            )));
        }
        Ok(Self {
            native_fps,
            analysis_fps,
        })
    }

    pub fn native_fps(&self) -> u32 {
        self.native_fps
    }

    pub fn analysis_fps(&self) -> u32 {
        self.analysis_fps
    }

    /// Native frames in one hour of recording.
    pub fn native_frames_per_hour(&self) -> u64 {
        self.native_fps as u64 * SECS_PER_HOUR
    }

    /// Frame indices yielded per hour.
    pub fn analysis_frames_per_hour(&self) -> u64 {
        self.analysis_fps as u64 * SECS_PER_HOUR
    }

    /// Mean stride between yielded frames.
    pub fn mean_stride(&self) -> f64 {
        self.native_fps as f64 / self.analysis_fps as f64
    }

    /// A fresh pass over one hour of frame indices.
    pub fn frames(&self) -> DecimatedFrames {
        DecimatedFrames {
            native_fps: self.native_fps as i64,
            analysis_fps: self.analysis_fps as i64,
            end: self.native_frames_per_hour(),
            cursor: 0,
            residual: 0,
        }
    }

    /// The stride taken after each yielded frame, in order.
    pub fn steps(&self) -> Steps {
        Steps(self.frames())
    }
}

impl IntoIterator for FrameDecimator {
    type Item = u64;
    type IntoIter = DecimatedFrames;

    fn into_iter(self) -> Self::IntoIter {
        self.frames()
    }
}

/// Iterator over decimated frame indices for one hour.
#[derive(Debug, Clone)]
pub struct DecimatedFrames {
    native_fps: i64,
    analysis_fps: i64,
    end: u64,
    cursor: u64,
    /// Accumulated rounding error, in units of `1 / analysis_fps` frames.
    residual: i64,
}

impl DecimatedFrames {
    /// Yield the current frame and advance by one rounded stride.
    fn advance(&mut self) -> Option<(u64, u64)> {
        if self.cursor >= self.end {
            return None;
        }
        let frame = self.cursor;

        let target = self.native_fps + self.residual;
        let step = div_round_half_even(target, self.analysis_fps);
        self.residual = target - step * self.analysis_fps;
        self.cursor += step as u64;

        Some((frame, step as u64))
    }
}

impl Iterator for DecimatedFrames {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.advance().map(|(frame, _)| frame)
    }
}

/// Iterator over the strides of a decimation pass.
#[derive(Debug, Clone)]
pub struct Steps(DecimatedFrames);

impl Iterator for Steps {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.0.advance().map(|(_, step)| step)
    }
}

/// `num / den` rounded to the nearest integer, ties to even. `den > 0`.
///
/// Ties are decided on the exact remainder, never on a rounded quotient.
fn div_round_half_even(num: i64, den: i64) -> i64 {
    let quot = num.div_euclid(den);
    let twice_rem = 2 * num.rem_euclid(den);
    if twice_rem < den || (twice_rem == den && quot % 2 == 0) {
        quot
    } else {
        quot + 1
    }
}
