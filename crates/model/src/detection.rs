//! Raw detector output.
//!
//! Each row of a raw file is `frame, x, y, w, h, confidence, feature...`.
//! Rows are kept as plain numeric vectors; accessors name the fields.

use privid_common::error::{PrividError, PrividResult};

/// Frame index within one hour of native-rate video.
pub type FrameIndex = u64;

/// One detection emitted by the upstream detector.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRow {
    values: Vec<f64>,
}

/// All detections sampled at one analyzed frame (possibly none).
pub type Frame = Vec<DetectionRow>;

/// Consecutive analyzed frames aggregated together.
pub type Chunk = Vec<Frame>;

impl DetectionRow {
    /// Frame index, four box coordinates, and confidence.
    pub const MIN_FIELDS: usize = 6;

    pub fn new(values: Vec<f64>) -> PrividResult<Self> {
        if values.len() < Self::MIN_FIELDS {
            return Err(PrividError::processing(format!(
                "Detection row has {} fields, expected at least {}",
                values.len(),
                Self::MIN_FIELDS
            )));
        }
        let frame = values[0];
        if !frame.is_finite() || frame < 0.0 || frame.fract() != 0.0 {
            return Err(PrividError::processing(format!(
                "Detection row has invalid frame index {frame}"
            )));
        }
        Ok(Self { values })
    }

    pub fn frame_index(&self) -> FrameIndex {
        self.values[0] as FrameIndex
    }

    /// Box as `[left, top, width, height]`.
    pub fn tlwh(&self) -> [f64; 4] {
        [self.values[1], self.values[2], self.values[3], self.values[4]]
    }

    pub fn confidence(&self) -> f64 {
        self.values[5]
    }

    /// Appearance embedding used for re-identification.
    ///
    /// Starts at the confidence column, not after it. Every published
    /// result was produced with this slicing, so it stays.
    pub fn appearance_feature(&self) -> &[f64] {
        &self.values[5..]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_name_fields() {
        let row = DetectionRow::new(vec![12.0, 1.0, 2.0, 3.0, 4.0, 0.9, 0.1, 0.2]).unwrap();
        assert_eq!(row.frame_index(), 12);
        assert_eq!(row.tlwh(), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(row.confidence(), 0.9);
    }

    #[test]
    fn appearance_feature_includes_confidence() {
        let row = DetectionRow::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 0.9, 0.1, 0.2]).unwrap();
        assert_eq!(row.appearance_feature(), &[0.9, 0.1, 0.2]);
    }

    #[test]
    fn short_rows_are_rejected() {
        assert!(DetectionRow::new(vec![0.0, 1.0, 2.0]).is_err());
    }

    #[test]
    fn fractional_or_negative_frames_are_rejected() {
        assert!(DetectionRow::new(vec![1.5, 0.0, 0.0, 1.0, 1.0, 0.5]).is_err());
        assert!(DetectionRow::new(vec![-1.0, 0.0, 0.0, 1.0, 1.0, 0.5]).is_err());
        assert!(DetectionRow::new(vec![f64::NAN, 0.0, 0.0, 1.0, 1.0, 0.5]).is_err());
    }
}
